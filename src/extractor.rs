use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::layer::SchemaLayer;

/// A single field parsed out of a declaration body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub type_expr: String,
    pub optional: bool,
    pub array: bool,
    /// 1-based line in the source text
    pub line: usize,
}

impl FieldDeclaration {
    pub fn new(name: &str, type_expr: &str, optional: bool, line: usize) -> Self {
        Self {
            name: name.to_string(),
            type_expr: type_expr.to_string(),
            optional,
            array: is_array_type(type_expr),
            line,
        }
    }

    pub fn normalized_type(&self) -> String {
        normalize_type(&self.type_expr)
    }
}

/// Fields of one declaration in one layer for one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub layer: SchemaLayer,
    pub domain: String,
    pub declaration: String,
    pub fields: Vec<FieldDeclaration>,
    pub source: Option<PathBuf>,
}

impl Schema {
    pub fn new(layer: SchemaLayer, domain: &str, declaration: &str) -> Self {
        Self {
            layer,
            domain: domain.to_string(),
            declaration: declaration.to_string(),
            fields: Vec::new(),
            source: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldDeclaration>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDeclaration> {
        self.fields.iter().filter(|f| !f.optional)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = &FieldDeclaration> {
        self.fields.iter().filter(|f| f.optional)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Declaration not found: {0}")]
    SchemaNotFound(String),

    #[error("Declaration {0} has an unbalanced body")]
    ParseAmbiguous(String),
}

/// Extract the fields of `declaration`; an absent or unbalanced declaration
/// yields an empty list.
pub fn extract(text: &str, declaration: &str) -> Vec<FieldDeclaration> {
    match try_extract(text, declaration) {
        Ok(fields) => fields,
        Err(err) => {
            debug!(declaration, error = %err, "no fields extracted");
            Vec::new()
        }
    }
}

/// Extract the fields of `declaration`, reporting why nothing was found
pub fn try_extract(text: &str, declaration: &str) -> Result<Vec<FieldDeclaration>, ExtractError> {
    let header = declaration_header(declaration);
    let lines: Vec<&str> = text.lines().collect();
    let span = find_block(&lines, &header, declaration)?;

    let mut fields = Vec::new();
    let mut pending: Option<PendingField> = None;

    for piece in body_pieces(&lines, span) {
        let trimmed = piece.text.trim();

        if let Some(mut field) = pending.take() {
            match field.mode {
                Continuation::Nested => {
                    if !trimmed.is_empty() {
                        field.parts.push(trimmed.to_string());
                    }
                    if piece.depth_after <= 1 {
                        push_finished(&mut fields, field, declaration);
                    } else {
                        pending = Some(field);
                    }
                    continue;
                }
                Continuation::Union => {
                    if trimmed.starts_with('|') || trimmed.starts_with('&') {
                        field.parts.push(trimmed.to_string());
                        if piece.terminated || piece.depth_before != 1 {
                            push_finished(&mut fields, field, declaration);
                        } else {
                            pending = Some(field);
                        }
                        continue;
                    }
                    if trimmed.is_empty() && !piece.terminated {
                        pending = Some(field);
                        continue;
                    }
                    push_finished(&mut fields, field, declaration);
                }
            }
        }

        if piece.depth_before != 1 || trimmed.is_empty() || trimmed.starts_with("static ") {
            continue;
        }
        let Some(captures) = member_pattern().captures(trimmed) else {
            continue;
        };

        let name = &captures[1];
        let optional = captures.get(2).is_some();
        let rest = captures[3].trim();

        if piece.depth_after > 1 {
            pending = Some(PendingField::new(name, optional, rest, piece.line, Continuation::Nested));
        } else if !piece.terminated && (rest.is_empty() || rest.ends_with('|') || rest.ends_with('&')) {
            pending = Some(PendingField::new(name, optional, rest, piece.line, Continuation::Union));
        } else if let Some(field) = build_field(name, optional, rest, piece.line) {
            push_unique(&mut fields, field, declaration);
        }
    }

    if let Some(field) = pending {
        push_finished(&mut fields, field, declaration);
    }

    Ok(fields)
}

/// Whether `text` contains a structural declaration named `declaration`
pub fn declares(text: &str, declaration: &str) -> bool {
    let header = declaration_header(declaration);
    text.lines().any(|line| header.is_match(line))
}

/// First candidate name declared in `text`
pub fn find_declaration<'a>(text: &str, candidates: &'a [String]) -> Option<&'a str> {
    candidates
        .iter()
        .find(|name| declares(text, name))
        .map(String::as_str)
}

/// Collapse whitespace and drop it next to type punctuation, so
/// `string | null` and `string|null` compare equal.
pub fn normalize_type(type_expr: &str) -> String {
    let collapsed: Vec<char> = type_expr
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();

    let mut out = String::with_capacity(collapsed.len());
    for (i, c) in collapsed.iter().enumerate() {
        if *c == ' ' {
            let prev_punct = out.chars().last().map(is_type_punct).unwrap_or(true);
            let next_punct = collapsed.get(i + 1).map(|n| is_type_punct(*n)).unwrap_or(true);
            if prev_punct || next_punct {
                continue;
            }
        }
        out.push(*c);
    }
    out.trim_end_matches([';', ',']).to_string()
}

/// Trailing `[]` or an `Array<...>` wrapper, ignoring a nullish union tail
pub fn is_array_type(type_expr: &str) -> bool {
    let mut core = normalize_type(type_expr);
    loop {
        if let Some(stripped) = core.strip_suffix("|null").or_else(|| core.strip_suffix("|undefined")) {
            core = stripped.to_string();
        } else {
            break;
        }
    }
    core.ends_with("[]")
        || ((core.starts_with("Array<") || core.starts_with("ReadonlyArray<")) && core.ends_with('>'))
}

/// Line span (0-based, inclusive) of a brace-delimited block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockSpan {
    pub start: usize,
    pub end: usize,
}

/// Locate the block introduced by the first line matching `header` by
/// balancing braces from that line onward.
pub(crate) fn find_block(lines: &[&str], header: &Regex, name: &str) -> Result<BlockSpan, ExtractError> {
    let start = lines
        .iter()
        .position(|line| header.is_match(line))
        .ok_or_else(|| ExtractError::SchemaNotFound(name.to_string()))?;

    let mut depth: i64 = 0;
    let mut opened = false;
    let mut in_comment = false;

    for (idx, raw) in lines.iter().enumerate().skip(start) {
        let code = strip_comments(raw, &mut in_comment);
        for c in code_chars(&code) {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => {
                    depth -= 1;
                    if opened && depth == 0 {
                        return Ok(BlockSpan { start, end: idx });
                    }
                    if depth < 0 {
                        return Err(ExtractError::ParseAmbiguous(name.to_string()));
                    }
                }
                _ => {}
            }
        }
        if !opened && code.trim_end().ends_with(';') {
            // plain alias such as `type X = Y;`
            return Err(ExtractError::SchemaNotFound(name.to_string()));
        }
    }

    Err(ExtractError::ParseAmbiguous(name.to_string()))
}

/// Remove `//` and `/* */` comments outside string literals
pub(crate) fn strip_comments(line: &str, in_block: &mut bool) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if *in_block {
            if c == '*' && next == Some('/') {
                *in_block = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(n) = next {
                    out.push(n);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, next) {
            ('/', Some('/')) => break,
            ('/', Some('*')) => {
                *in_block = true;
                i += 2;
            }
            ('"', _) | ('\'', _) | ('`', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    // JSDoc continuation lines (` * @param ...`) carry no code
    if out.trim_start().starts_with('*') && !out.contains(':') {
        return String::new();
    }
    out
}

/// Member-sized slice of a declaration body
#[derive(Debug, Clone, PartialEq, Eq)]
struct BodyPiece {
    text: String,
    /// 1-based
    line: usize,
    /// Brace depth relative to the file, 1 directly inside the body
    depth_before: i64,
    depth_after: i64,
    /// Ended by a `;` or `,` separator rather than a line end
    terminated: bool,
}

/// Split the body of the block at `span` at line ends and at `;`/`,`
/// separators sitting directly inside the body. Text before the opening
/// brace and from the closing brace on is dropped, as are the separators.
fn body_pieces(lines: &[&str], span: BlockSpan) -> Vec<BodyPiece> {
    let mut pieces = Vec::new();
    let mut in_comment = false;
    let mut depth: i64 = 0;
    let mut opened = false;

    'lines: for (idx, raw) in lines.iter().enumerate().take(span.end + 1).skip(span.start) {
        let code = strip_comments(raw, &mut in_comment);
        let line = idx + 1;
        let mut text = String::new();
        let mut start_depth = depth;
        // parens, brackets and generics; reset per line
        let mut nesting: i64 = 0;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut prev: Option<char> = None;

        for c in code.chars() {
            if let Some(q) = quote {
                if opened {
                    text.push(c);
                }
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                prev = Some(c);
                continue;
            }

            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => {
                    depth += 1;
                    if !opened {
                        opened = true;
                        start_depth = depth;
                        nesting = 0;
                        prev = Some(c);
                        continue;
                    }
                }
                '}' => {
                    depth -= 1;
                    if opened && depth == 0 {
                        pieces.push(BodyPiece {
                            text,
                            line,
                            depth_before: start_depth,
                            depth_after: 1,
                            terminated: false,
                        });
                        break 'lines;
                    }
                }
                '(' | '[' | '<' => nesting += 1,
                ')' | ']' => nesting -= 1,
                '>' if prev != Some('=') => nesting -= 1,
                ';' | ',' if opened && depth == 1 && nesting <= 0 => {
                    pieces.push(BodyPiece {
                        text: std::mem::take(&mut text),
                        line,
                        depth_before: start_depth,
                        depth_after: depth,
                        terminated: true,
                    });
                    start_depth = depth;
                    nesting = 0;
                    prev = Some(c);
                    continue;
                }
                _ => {}
            }

            if opened {
                text.push(c);
            }
            prev = Some(c);
        }

        if opened {
            pieces.push(BodyPiece {
                text,
                line,
                depth_before: start_depth,
                depth_after: depth,
                terminated: false,
            });
        }
    }
    pieces
}

/// Characters of `code` outside string literals
fn code_chars(code: &str) -> impl Iterator<Item = char> + '_ {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    code.chars().filter(move |&c| {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            return false;
        }
        if c == '"' || c == '\'' || c == '`' {
            quote = Some(c);
            return false;
        }
        true
    })
}

fn declaration_header(declaration: &str) -> Regex {
    let pattern = format!(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:interface|type|class)\s+{}\b",
        regex::escape(declaration)
    );
    Regex::new(&pattern).expect("escaped declaration name")
}

fn member_pattern() -> &'static Regex {
    static MEMBER: OnceLock<Regex> = OnceLock::new();
    MEMBER.get_or_init(|| {
        Regex::new(
            r"^(?:(?:readonly|public|private|protected|declare|override|static)\s+)*([A-Za-z_$][\w$]*)(\?)?\s*:\s*(.*)$",
        )
        .expect("static pattern")
    })
}

fn build_field(name: &str, optional: bool, rest: &str, line: usize) -> Option<FieldDeclaration> {
    let type_expr = clean_type(rest);
    if type_expr.is_empty() {
        return None;
    }
    Some(FieldDeclaration::new(name, &type_expr, optional, line))
}

fn clean_type(raw: &str) -> String {
    let trimmed = raw.trim();
    // class fields may carry an initializer: `readonly tags: string[] = [];`
    let without_init = match top_level_assignment(trimmed) {
        Some(pos) => trimmed[..pos].trim_end(),
        None => trimmed,
    };
    without_init
        .trim_end_matches([';', ','])
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Position of an `=` that is not part of `=>`, outside brackets
fn top_level_assignment(type_text: &str) -> Option<usize> {
    let bytes = type_text.as_bytes();
    let mut nesting = 0i32;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' | b'<' => nesting += 1,
            b')' | b']' | b'}' => nesting -= 1,
            b'>' if i > 0 && bytes[i - 1] != b'=' => nesting -= 1,
            b'=' if nesting == 0 && bytes.get(i + 1) != Some(&b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn is_type_punct(c: char) -> bool {
    matches!(
        c,
        '|' | '&' | '<' | '>' | ',' | ';' | ':' | '(' | ')' | '[' | ']' | '{' | '}' | '?' | '='
    )
}

fn push_unique(fields: &mut Vec<FieldDeclaration>, field: FieldDeclaration, declaration: &str) {
    if fields.iter().any(|f| f.name == field.name) {
        warn!(declaration, field = %field.name, line = field.line, "duplicate field ignored");
        return;
    }
    fields.push(field);
}

fn push_finished(fields: &mut Vec<FieldDeclaration>, pending: PendingField, declaration: &str) {
    if let Some(field) = pending.finish() {
        push_unique(fields, field, declaration);
    }
}

#[derive(Debug, Clone, Copy)]
enum Continuation {
    /// inline object type spanning several lines
    Nested,
    /// union or intersection continued with leading `|` / `&`
    Union,
}

#[derive(Debug)]
struct PendingField {
    name: String,
    optional: bool,
    parts: Vec<String>,
    line: usize,
    mode: Continuation,
}

impl PendingField {
    fn new(name: &str, optional: bool, first: &str, line: usize, mode: Continuation) -> Self {
        let parts = if first.is_empty() { Vec::new() } else { vec![first.to_string()] };
        Self {
            name: name.to_string(),
            optional,
            parts,
            line,
            mode,
        }
    }

    fn finish(self) -> Option<FieldDeclaration> {
        let joined = self.parts.join(" ");
        build_field(&self.name, self.optional, joined.trim_start_matches(['|', '&']), self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY_DTO: &str = r#"
import { Paged } from "./paged";

/** Category payload */
export interface CategoryResponseDto {
  id: string;
  name: string;
  // free text
  description: string | null;
  isActive: boolean;
  tags?: string[];
  children: Array<CategoryResponseDto>;
}

export interface CategoryListDto {
  items: CategoryResponseDto[];
}
"#;

    #[test]
    fn test_extract_interface_fields_in_order() {
        let fields = extract(CATEGORY_DTO, "CategoryResponseDto");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "description", "isActive", "tags", "children"]);

        assert_eq!(fields[2].type_expr, "string | null");
        assert!(!fields[2].optional);
        assert!(fields[4].optional);
        assert!(fields[4].array);
        assert!(fields[5].array);
        assert!(!fields[0].array);
        assert_eq!(fields[0].line, 6);
    }

    #[test]
    fn test_absent_declaration_is_empty() {
        assert!(extract(CATEGORY_DTO, "MissingDto").is_empty());
        assert_eq!(
            try_extract(CATEGORY_DTO, "MissingDto"),
            Err(ExtractError::SchemaNotFound("MissingDto".to_string()))
        );
    }

    #[test]
    fn test_name_prefix_does_not_match_longer_declaration() {
        // `CategoryList` must not match `CategoryListDto`
        assert!(extract(CATEGORY_DTO, "CategoryList").is_empty());
    }

    #[test]
    fn test_unbalanced_body_is_ambiguous() {
        let text = "export interface Broken {\n  id: string;\n";
        assert_eq!(
            try_extract(text, "Broken"),
            Err(ExtractError::ParseAmbiguous("Broken".to_string()))
        );
        assert!(extract(text, "Broken").is_empty());
    }

    #[test]
    fn test_nested_inline_object_does_not_end_scan() {
        let text = r#"
export interface BrochureModel {
  id: string;
  meta: {
    author: string;
    pages: number;
  };
  title: string;
}
"#;
        let fields = extract(text, "BrochureModel");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "meta", "title"]);
        assert_eq!(fields[1].type_expr, "{ author: string; pages: number; }");
    }

    #[test]
    fn test_single_line_inline_object() {
        let text = "interface A {\n  range: { from: number; to: number };\n}\n";
        let fields = extract(text, "A");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].type_expr, "{ from: number; to: number }");
    }

    #[test]
    fn test_leading_union_continuation() {
        let text = r#"
export type StatusModel = {
  status:
    | "draft"
    | "published";
  id: string;
};
"#;
        let fields = extract(text, "StatusModel");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "status");
        assert_eq!(fields[0].type_expr, r#""draft" | "published""#);
        assert_eq!(fields[1].name, "id");
    }

    #[test]
    fn test_class_readonly_fields() {
        let text = r#"
export class BrochurePresenter implements BrochureModel {
  readonly id: string;
  readonly title?: string;
  private readonly cache: Map<string, number> = new Map();
  static readonly EMPTY: string = "";

  constructor(props: BrochureModel) {
    this.id = props.id;
  }

  get label(): string {
    return `${this.id}`;
  }
}
"#;
        let fields = extract(text, "BrochurePresenter");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "title", "cache"]);
        assert!(fields[1].optional);
        assert_eq!(fields[2].type_expr, "Map<string, number>");
    }

    #[test]
    fn test_comments_and_braces_in_strings_are_ignored() {
        let text = r#"
export interface Noisy {
  /* block { comment */
  /**
   * multi-line doc
   */
  label: "{";  // trailing } comment
  id: string;
}
"#;
        let fields = extract(text, "Noisy");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["label", "id"]);
        assert_eq!(fields[0].type_expr, r#""{""#);
    }

    #[test]
    fn test_single_line_declaration() {
        let text = "export interface Tiny { a: string; b?: number[] }\n";
        let fields = extract(text, "Tiny");
        assert_eq!(fields.len(), 2);
        assert!(fields[1].optional);
        assert!(fields[1].array);
    }

    #[test]
    fn test_single_line_declaration_with_inline_object() {
        let text = "export interface Range { span: { from: number; to: number }; label: string }";
        let fields = extract(text, "Range");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["span", "label"]);
        assert_eq!(fields[0].type_expr, "{ from: number; to: number }");
        assert_eq!(fields[1].type_expr, "string");
        assert_eq!(fields[1].line, 1);
    }

    #[test]
    fn test_single_line_separators_inside_generics_and_calls() {
        let text = "export interface Lookup { index: Record<string, number>, pick: (a: string, b: number) => void; id: string }";
        let fields = extract(text, "Lookup");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["index", "pick", "id"]);
        assert_eq!(fields[0].type_expr, "Record<string, number>");
        assert_eq!(fields[1].type_expr, "(a: string, b: number) => void");
    }

    #[test]
    fn test_field_on_header_line() {
        let text = "export interface Tag { id: string;\n  name: string;\n}\n";
        let fields = extract(text, "Tag");
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(fields[0].line, 1);
        assert_eq!(fields[1].line, 2);
    }

    #[test]
    fn test_field_on_closing_line() {
        let text = "export interface Tag {\n  id: string;\n  name: string; }\nconst other = { x: 1 };\n";
        let fields = extract(text, "Tag");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "name");
        assert_eq!(fields[1].type_expr, "string");

        let nested = "export interface Tag {\n  meta: {\n    a: string; } }\n";
        let fields = extract(nested, "Tag");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].type_expr, "{ a: string; }");
    }

    #[test]
    fn test_brace_on_following_line() {
        let text = "export interface Wide\n  extends Base\n{\n  id: string;\n}\n";
        let fields = extract(text, "Wide");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].line, 4);
    }

    #[test]
    fn test_type_alias_without_body_is_not_found() {
        let text = "export type Alias = Other;\n";
        assert_eq!(
            try_extract(text, "Alias"),
            Err(ExtractError::SchemaNotFound("Alias".to_string()))
        );
    }

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("string | null"), normalize_type("string|null"));
        assert_eq!(normalize_type("Array< string >"), "Array<string>");
        assert_eq!(normalize_type("keyof   T"), "keyof T");
        assert_eq!(normalize_type("number;"), "number");
    }

    #[test]
    fn test_is_array_type() {
        assert!(is_array_type("string[]"));
        assert!(is_array_type("string[] | null"));
        assert!(is_array_type("Array<Foo>"));
        assert!(!is_array_type("Map<string, Foo[]> | Bar"));
        assert!(!is_array_type("string"));
    }

    #[test]
    fn test_find_declaration_picks_first_declared() {
        let candidates = vec![
            "CategoryDto".to_string(),
            "CategoryResponseDto".to_string(),
            "CategoryListDto".to_string(),
        ];
        assert_eq!(find_declaration(CATEGORY_DTO, &candidates), Some("CategoryResponseDto"));
    }
}
