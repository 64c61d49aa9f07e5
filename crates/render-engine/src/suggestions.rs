//! Fuzzy matching for template error suggestions
//!
//! Uses Levenshtein distance to propose the function or key the author
//! most likely meant.

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// All functions callable from a template
pub const AVAILABLE_FUNCTIONS: &[&str] = &[
    // Go builtins
    "and",
    "or",
    "not",
    "eq",
    "ne",
    "lt",
    "le",
    "gt",
    "ge",
    "len",
    "index",
    "slice",
    "print",
    "printf",
    "println",
    "html",
    "js",
    "urlquery",
    // Strings
    "upper",
    "lower",
    "title",
    "trim",
    "trimPrefix",
    "trimSuffix",
    "trunc",
    "quote",
    "squote",
    "replace",
    "contains",
    "hasPrefix",
    "hasSuffix",
    "repeat",
    "split",
    "join",
    "indent",
    "nindent",
    "snakecase",
    "kebabcase",
    "regexMatch",
    "regexReplaceAll",
    // Encoding
    "b64enc",
    "b64dec",
    "toYaml",
    "fromYaml",
    "toJson",
    "toPrettyJson",
    "fromJson",
    "sha256sum",
    "sha1sum",
    // Defaults and flow
    "default",
    "required",
    "empty",
    "coalesce",
    "ternary",
    "fail",
    // Collections
    "list",
    "dict",
    "get",
    "set",
    "unset",
    "hasKey",
    "keys",
    "merge",
    "dig",
    "first",
    "last",
    // Conversion
    "toString",
    "toStrings",
    "atoi",
    "int",
    "float64",
    // Math
    "add",
    "sub",
    "mul",
    "div",
    "mod",
    "max",
    "min",
    // Misc
    "now",
    "semverCompare",
    "render",
];

/// Whether `name` can be called from a template
pub fn is_function(name: &str) -> bool {
    AVAILABLE_FUNCTIONS.contains(&name)
}

/// Suggestion result with confidence scoring
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
    /// Category of suggestion
    pub category: SuggestionCategory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuggestionCategory {
    Function,
    Key,
}

/// Find closest matches from a list of candidates
pub fn find_closest_matches(
    input: &str,
    candidates: &[&str],
    max_results: usize,
    category: SuggestionCategory,
) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = strsim::levenshtein(input, candidate);
            if distance <= MAX_SUGGESTION_DISTANCE && distance > 0 {
                Some(Suggestion {
                    text: candidate.to_string(),
                    distance,
                    category,
                })
            } else {
                None
            }
        })
        .collect();

    // Sort by distance, then alphabetically for stable output
    suggestions.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.text.cmp(&b.text)));
    suggestions.truncate(max_results);
    suggestions
}

/// Suggest corrections for an unknown function
pub fn suggest_unknown_function(func_name: &str) -> String {
    let matches = find_closest_matches(func_name, AVAILABLE_FUNCTIONS, 3, SuggestionCategory::Function);

    if matches.is_empty() {
        format!(
            "Unknown function `{}`. Available functions: {}",
            func_name,
            AVAILABLE_FUNCTIONS.join(", ")
        )
    } else {
        let suggestions: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
        format!("Did you mean {}?", suggestions.join(" or "))
    }
}

/// Suggest keys present next to a missing one
pub fn suggest_missing_key(key: &str, available: &[String]) -> Option<String> {
    if available.is_empty() {
        return None;
    }

    let candidates: Vec<&str> = available.iter().map(|s| s.as_str()).collect();
    let matches = find_closest_matches(key, &candidates, 3, SuggestionCategory::Key);

    if matches.is_empty() {
        Some(format!("Available keys: {}", available.join(", ")))
    } else {
        let suggestions: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
        Some(format!(
            "Did you mean {}? Available keys: {}",
            suggestions.join(" or "),
            available.join(", ")
        ))
    }
}
