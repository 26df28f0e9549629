// Change-Log Tokenizer
// Splits one packed "Change Log" cell into individual field=value assignments

// ============================================================================
// TOP-LEVEL COMMA SPLIT
// ============================================================================

/// Split one change-log string into its top-level fragments.
///
/// A comma is a delimiter only at nesting depth 0; commas inside `[...]` or
/// `{...}` belong to the fragment. Fragments are trimmed. Unbalanced brackets
/// are tolerated (the depth counter may go negative) - the source export is
/// not trusted to be well formed.
pub fn split_changes(log: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;

    for ch in log.chars() {
        if ch == ',' && depth == 0 {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            match ch {
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                _ => {}
            }
            current.push(ch);
        }
    }

    if !current.is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
}

// ============================================================================
// FIELD ASSIGNMENTS
// ============================================================================

/// Extract ordered `(field, rawValue)` pairs from a change-log string.
///
/// Each fragment is split on its first `=`; fragments without one are
/// malformed and silently dropped. The raw value keeps any nested structure
/// untouched - classification happens later in the value normalizer.
pub fn parse_assignments(log: &str) -> Vec<(String, String)> {
    split_changes(log)
        .into_iter()
        .filter_map(|fragment| {
            let (field, value) = fragment.split_once('=')?;
            Some((field.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_fields() {
        let parts = split_changes("name=Serum Aliquot,volume=5,unit=ml");
        assert_eq!(parts, vec!["name=Serum Aliquot", "volume=5", "unit=ml"]);
    }

    #[test]
    fn test_split_respects_braces() {
        let parts = split_changes("siteId={id=5},specimens=[{id=1},{id=2}]");
        assert_eq!(parts, vec!["siteId={id=5}", "specimens=[{id=1},{id=2}]"]);
    }

    #[test]
    fn test_split_nested_list_commas_do_not_split() {
        let parts = split_changes("tags=[a,b,c]");
        assert_eq!(parts, vec!["tags=[a,b,c]"]);
    }

    #[test]
    fn test_split_trims_whitespace() {
        let parts = split_changes("  a=1 ,  b=2  ");
        assert_eq!(parts, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_split_empty_input() {
        assert!(split_changes("").is_empty());
    }

    #[test]
    fn test_split_tolerates_unbalanced_brackets() {
        // Depth goes negative on the stray ']' - permissive by contract
        let parts = split_changes("a=x],b=y");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "a=x]");
        assert_eq!(parts[1], "b=y");
    }

    #[test]
    fn test_assignments_split_on_first_equals() {
        let pairs = parse_assignments("formula=a=b+c,volume=5");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("formula".to_string(), "a=b+c".to_string()));
        assert_eq!(pairs[1], ("volume".to_string(), "5".to_string()));
    }

    #[test]
    fn test_assignments_drop_malformed_fragments() {
        let pairs = parse_assignments("volume=5,garbage,unit=ml");
        assert_eq!(pairs.len(), 2, "Fragment without '=' should be dropped");
        assert_eq!(pairs[0].0, "volume");
        assert_eq!(pairs[1].0, "unit");
    }

    #[test]
    fn test_assignments_empty_fragments_dropped() {
        let pairs = parse_assignments("a=1,,b=2");
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_split_rejoin_reproduces_fragments() {
        // Balanced-bracket inputs round-trip through split + rejoin
        let input = "a=1, b=[x,{y=2}], c={id=3}";
        let parts = split_changes(input);
        assert_eq!(parts.join(", "), "a=1, b=[x,{y=2}], c={id=3}");
    }
}
