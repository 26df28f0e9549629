// Value Normalizer
// Classifies a raw change-log value and rewrites identifier references into
// display labels. Classification order (first match wins):
//   1. one or more `{id=<digits>}` tokens   -> labels joined with ", "
//   2. literal id structure (list/mapping)  -> labels joined / single label
//   3. anything else                        -> raw text unchanged

use regex::Regex;

use crate::resolver::Resolver;

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct ValueNormalizer {
    id_token: Regex,
}

impl ValueNormalizer {
    pub fn new() -> Self {
        ValueNormalizer {
            // Non-negative integral identifiers only
            id_token: Regex::new(r"\{id=(\d+)\}").expect("id token pattern is valid"),
        }
    }

    /// Resolve one raw value to its display string.
    ///
    /// `field` scopes the remote lookup to the right catalog. Resolution
    /// failures degrade to the decimal identifier inside the resolver and
    /// never abort the row.
    pub fn normalize(&self, field: &str, raw: &str, resolver: &mut Resolver) -> String {
        let ids: Vec<i64> = self
            .id_token
            .captures_iter(raw)
            .filter_map(|caps| caps[1].parse().ok())
            .collect();

        if !ids.is_empty() {
            return join_labels(&ids, field, resolver);
        }

        match parse_id_literal(raw) {
            Some(IdLiteral::Many(ids)) => join_labels(&ids, field, resolver),
            Some(IdLiteral::Single(id)) => resolver.resolve(field, id),
            None => raw.to_string(),
        }
    }
}

impl Default for ValueNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn join_labels(ids: &[i64], field: &str, resolver: &mut Resolver) -> String {
    ids.iter()
        .map(|&id| resolver.resolve(field, id))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// LITERAL GRAMMAR
// ============================================================================
// Recognizes exactly the two accepted shapes and nothing else:
//   - a bracketed list of mappings, each containing an `id` key
//   - a single mapping containing an `id` key
// Keys may be bare or quoted with ' or "; the key/value separator is ':' or
// '='; non-id values (strings, numbers, nested structures, bare words) are
// skipped. `id` values must be non-negative integers. Any other shape is
// rejected and the caller passes the raw text through unchanged.

#[derive(Debug, PartialEq, Eq)]
pub enum IdLiteral {
    Single(i64),
    Many(Vec<i64>),
}

/// Try to read a raw value as an identifier literal
pub fn parse_id_literal(raw: &str) -> Option<IdLiteral> {
    let mut scanner = Scanner::new(raw.trim());

    let literal = match scanner.peek()? {
        b'[' => IdLiteral::Many(scanner.list()?),
        b'{' => IdLiteral::Single(scanner.mapping()?),
        _ => return None,
    };

    scanner.skip_ws();
    if !scanner.at_end() {
        return None;
    }
    Some(literal)
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    /// `[ mapping (, mapping)* ]` - every element must carry an id
    fn list(&mut self) -> Option<Vec<i64>> {
        if !self.eat(b'[') {
            return None;
        }
        let mut ids = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(b']') {
                break;
            }
            ids.push(self.mapping()?);
            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            if self.peek() == Some(b']') {
                continue;
            }
            return None;
        }
        // An empty list carries no reference - not an id literal
        if ids.is_empty() {
            None
        } else {
            Some(ids)
        }
    }

    /// `{ key sep value (, key sep value)* }` - yields the id entry
    fn mapping(&mut self) -> Option<i64> {
        if !self.eat(b'{') {
            return None;
        }
        let mut id = None;
        loop {
            self.skip_ws();
            if self.eat(b'}') {
                break;
            }
            let key = self.key()?;
            self.skip_ws();
            if !(self.eat(b':') || self.eat(b'=')) {
                return None;
            }
            self.skip_ws();
            if key == "id" {
                id = Some(self.integer()?);
            } else {
                self.skip_value()?;
            }
            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            if self.peek() == Some(b'}') {
                continue;
            }
            return None;
        }
        id
    }

    /// Bare identifier or quoted string key
    fn key(&mut self) -> Option<String> {
        match self.peek()? {
            quote @ (b'\'' | b'"') => {
                self.pos += 1;
                let start = self.pos;
                while self.peek() != Some(quote) {
                    self.peek()?;
                    self.pos += 1;
                }
                let key = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.pos += 1;
                Some(key)
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                    self.pos += 1;
                }
                if self.pos == start {
                    return None;
                }
                Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
            }
        }
    }

    /// Non-negative integer - the only accepted shape for an id value
    fn integer(&mut self) -> Option<i64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    /// Skip over a value we do not care about: a quoted string, a balanced
    /// nested structure, or a bare token running to the next delimiter.
    fn skip_value(&mut self) -> Option<()> {
        match self.peek()? {
            quote @ (b'\'' | b'"') => {
                self.pos += 1;
                loop {
                    match self.peek()? {
                        b'\\' => self.pos += 2,
                        c if c == quote => {
                            self.pos += 1;
                            return Some(());
                        }
                        _ => self.pos += 1,
                    }
                }
            }
            b'[' | b'{' => {
                let mut depth = 0i32;
                loop {
                    match self.peek()? {
                        b'[' | b'{' => depth += 1,
                        b']' | b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                self.pos += 1;
                                return Some(());
                            }
                        }
                        quote @ (b'\'' | b'"') => {
                            self.pos += 1;
                            while self.peek() != Some(quote) {
                                self.peek()?;
                                self.pos += 1;
                            }
                        }
                        _ => {}
                    }
                    self.pos += 1;
                }
            }
            _ => {
                let start = self.pos;
                while !matches!(self.peek(), None | Some(b',') | Some(b'}') | Some(b']')) {
                    self.pos += 1;
                }
                if self.pos == start {
                    return None;
                }
                Some(())
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::resolver::{LabelCache, LabelSource};
    use std::collections::HashMap;

    /// Fake catalog: answers from a map, anything else fails the fetch
    struct FakeSource {
        labels: HashMap<i64, String>,
    }

    impl FakeSource {
        fn new(entries: &[(i64, &str)]) -> Self {
            FakeSource {
                labels: entries
                    .iter()
                    .map(|(id, label)| (*id, label.to_string()))
                    .collect(),
            }
        }
    }

    impl LabelSource for FakeSource {
        fn fetch_label(&self, _attribute: &str, id: i64) -> Result<String, AuditError> {
            self.labels
                .get(&id)
                .cloned()
                .ok_or_else(|| AuditError::Api {
                    endpoint: format!("/rest/ng/permissible-values/v/{id}"),
                    status: 404,
                })
        }
    }

    fn normalize(raw: &str, cached: &[(i64, &str)], fetchable: &[(i64, &str)]) -> String {
        let mut cache = LabelCache::new();
        for (id, label) in cached {
            cache.put(*id, label.to_string());
        }
        let source = FakeSource::new(fetchable);
        let mut resolver = Resolver::new(&mut cache, &source);
        ValueNormalizer::new().normalize("specimen_type", raw, &mut resolver)
    }

    #[test]
    fn test_braced_token_resolves_from_cache() {
        assert_eq!(normalize("{id=42}", &[(42, "Blood")], &[]), "Blood");
    }

    #[test]
    fn test_multiple_braced_tokens_join_with_comma() {
        let resolved = normalize("{id=42},{id=9}", &[(42, "Blood"), (9, "Serum")], &[]);
        assert_eq!(resolved, "Blood, Serum");
    }

    #[test]
    fn test_failed_fetch_degrades_to_decimal() {
        // 42 cached, 7 unknown and fetch failing -> decimal fallback
        assert_eq!(normalize("{id=42},{id=7}", &[(42, "Blood")], &[]), "Blood, 7");
    }

    #[test]
    fn test_braced_token_inside_prose_wins_classification() {
        let resolved = normalize("changed to {id=5} today", &[(5, "Left Arm")], &[]);
        assert_eq!(resolved, "Left Arm");
    }

    #[test]
    fn test_literal_list_of_mappings() {
        let resolved = normalize(
            "[{'id': 1, 'name': 'x'}, {'id': 2}]",
            &[(1, "Serum"), (2, "Plasma")],
            &[],
        );
        assert_eq!(resolved, "Serum, Plasma");
    }

    #[test]
    fn test_literal_single_mapping() {
        let resolved = normalize("{'id': 5, 'name': 'site'}", &[(5, "Left Arm")], &[]);
        assert_eq!(resolved, "Left Arm");
    }

    #[test]
    fn test_literal_resolves_via_fetch() {
        let resolved = normalize("{'id': 8}", &[], &[(8, "Frozen")]);
        assert_eq!(resolved, "Frozen");
    }

    #[test]
    fn test_plain_scalar_passes_through() {
        assert_eq!(normalize("5", &[], &[]), "5");
        assert_eq!(normalize("Serum Aliquot", &[], &[]), "Serum Aliquot");
    }

    #[test]
    fn test_unrecognized_literal_passes_through() {
        assert_eq!(normalize("[1, 2, 3]", &[], &[]), "[1, 2, 3]");
        assert_eq!(normalize("[{'name': 'x'}]", &[], &[]), "[{'name': 'x'}]");
    }

    #[test]
    fn test_parse_literal_bare_keys_and_equals() {
        let literal = parse_id_literal("[{id=1, name=Serum}, {id=2}]");
        assert_eq!(literal, Some(IdLiteral::Many(vec![1, 2])));
    }

    #[test]
    fn test_parse_literal_quoted_keys_and_colons() {
        assert_eq!(
            parse_id_literal("{'id': 12, 'value': 'Whole Blood'}"),
            Some(IdLiteral::Single(12))
        );
        assert_eq!(
            parse_id_literal("[{\"id\": 3}, {\"id\": 4}]"),
            Some(IdLiteral::Many(vec![3, 4]))
        );
    }

    #[test]
    fn test_parse_literal_skips_nested_values() {
        let literal = parse_id_literal("[{'id': 1, 'meta': {'depth': [2, 3]}}]");
        assert_eq!(literal, Some(IdLiteral::Many(vec![1])));
    }

    #[test]
    fn test_parse_literal_rejects_negative_id() {
        assert_eq!(parse_id_literal("{'id': -3}"), None);
    }

    #[test]
    fn test_parse_literal_rejects_empty_list() {
        assert_eq!(parse_id_literal("[]"), None);
    }

    #[test]
    fn test_parse_literal_rejects_trailing_garbage() {
        assert_eq!(parse_id_literal("{'id': 3} extra"), None);
    }

    #[test]
    fn test_parse_literal_rejects_mapping_without_id() {
        assert_eq!(parse_id_literal("{'name': 'x'}"), None);
    }
}
