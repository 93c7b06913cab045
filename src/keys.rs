//! Reference key generation.
//!
//! A reference key is a lowercase `surname + year` style token used to match
//! in-text citations to bibliography entries. Many keys are emitted per
//! reference; any single shared key is enough to link a citation.

use std::sync::LazyLock;

use regex::Regex;

static BRACKETED_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{4})\]").unwrap());

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}[a-z]?)").unwrap());

static LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}").unwrap());

static TF_CITATION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CIT(\d+)").unwrap());

static TF_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{Lu}[\p{L}']+)").unwrap());

static SURNAME_FIRSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\p{Lu}[\p{L}'-]+)\s+(\p{Lu}[\p{L}']+)").unwrap()
});

static NAME_PARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(van|der|de|la|von)$").unwrap());

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}[\p{L}'-]+\b").unwrap());

static ACRONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}{2,}\b").unwrap());

static INITIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}").unwrap());

/// Capitalized tokens that are never surnames.
const CONNECTOR_WORDS: &[&str] = &[
    "And", "The", "For", "In", "An", "On", "As", "Ed", "Of", "See", "Also",
];

/// Upper bound on name words recovered from citation context.
const MAX_CONTEXT_NAME_WORDS: usize = 4;

/// Ordered, de-duplicated key list.
#[derive(Default)]
struct KeySet(Vec<String>);

impl KeySet {
    fn add(&mut self, key: String) {
        if !key.is_empty() && !self.0.contains(&key) {
            self.0.push(key);
        }
    }
}

/// First year token in `text`, with bracketed years treated as bare years.
pub fn find_year(text: &str) -> Option<String> {
    let processed = BRACKETED_YEAR.replace_all(text, " $1 ");
    YEAR.captures(&processed).map(|c| c[1].to_string())
}

/// Generate candidate lookup keys for a reference or in-text citation.
///
/// # Arguments
/// * `text` - Reference text or the inside of an in-text citation
/// * `context` - Text preceding the citation, used when `text` carries no author
/// * `format_id` - Format id; `taylor-francis` and `oup` have dedicated paths
///
/// # Returns
/// Keys in emission order without duplicates; empty when no year is present.
pub fn generate_keys(text: &str, context: &str, format_id: &str) -> Vec<String> {
    let Some(year) = find_year(text) else {
        return Vec::new();
    };
    let authors_text = text.find(&year).map_or(text, |i| &text[..i]);
    let has_author = LETTER.is_match(authors_text);

    let mut keys = KeySet::default();

    if format_id == "taylor-francis" {
        if let Some(caps) = TF_CITATION_ID.captures(text) {
            keys.add(format!("cit{}{}", &caps[1], year));
            keys.add(format!("citation{}{}", &caps[1], year));
        }
        if has_author {
            if let Some(caps) = TF_AUTHOR.captures(authors_text) {
                keys.add(format!("{}{}", caps[1].to_lowercase(), year));
            }
        }
    }

    if format_id == "oup" && has_author {
        if let Some(caps) = SURNAME_FIRSTNAME.captures(authors_text) {
            let surname = caps[1].to_lowercase();
            let firstname = caps[2].to_lowercase();
            keys.add(format!("{surname}{year}"));
            keys.add(format!("{surname}{firstname}{year}"));
            if surname.contains('-') {
                keys.add(format!("{}{}", surname.replace('-', ""), year));
            }
            return keys.0;
        }
    }

    let author_source = if has_author { authors_text } else { context };
    if !author_source.is_empty() {
        let source = if !has_author && !context.is_empty() {
            name_from_context(context)
        } else {
            author_source.to_string()
        };
        add_name_keys(&mut keys, &source, &year);
    }

    if text.contains("United Nations General Assembly") {
        keys.add(format!("un{year}"));
    }

    keys.0
}

/// Recover a plausible name span from the words preceding a year-only citation.
fn name_from_context(context: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for word in context.split_whitespace().rev() {
        let word = word.strip_suffix(',').unwrap_or(word);
        if word.starts_with(|c: char| c.is_uppercase()) || NAME_PARTICLE.is_match(word) {
            parts.insert(0, word);
        } else {
            break;
        }
        if parts.len() >= MAX_CONTEXT_NAME_WORDS {
            break;
        }
    }
    if !parts.is_empty() {
        return parts.join(" ");
    }
    CAPITALIZED_WORD
        .find_iter(context)
        .last()
        .map_or_else(|| context.to_string(), |m| m.as_str().to_string())
}

fn add_name_keys(keys: &mut KeySet, source: &str, year: &str) {
    let acronyms: Vec<&str> = ACRONYM.find_iter(source).map(|m| m.as_str()).collect();
    for acronym in &acronyms {
        keys.add(format!("{}{}", acronym.to_lowercase(), year));
    }

    let surnames: Vec<String> = CAPITALIZED_WORD
        .find_iter(source)
        .map(|m| m.as_str())
        .filter(|s| !CONNECTOR_WORDS.contains(s))
        .filter(|s| !acronyms.contains(s))
        .map(|s| s.to_lowercase().replacen("'s", "", 1))
        .collect();

    if !surnames.is_empty() {
        let has_comma = source.contains(',');

        let mut sorted = surnames.clone();
        sorted.sort();
        keys.add(format!("{}{}", sorted.concat(), year));

        if surnames.len() > 1 && !has_comma {
            keys.add(format!("{}{}", surnames.concat(), year));
        }

        let primary = if has_comma {
            &surnames[0]
        } else {
            &surnames[surnames.len() - 1]
        };
        keys.add(format!("{primary}{year}"));

        for surname in surnames.iter().filter(|s| s.contains('-')) {
            keys.add(format!("{}{}", surname.replace('-', ""), year));
        }
    }

    let initials: String = INITIAL.find_iter(source).map(|m| m.as_str()).collect();
    if initials.len() >= 2 {
        keys.add(format!("{}{}", initials.to_lowercase(), year));
    }
}

/// Initials of the capitalized words in `text` before the first occurrence of
/// `year`, e.g. `WHO` for "World Health Organization (2019)".
///
/// Returns `None` when `year` does not occur in `text`.
pub fn initials_before(text: &str, year: &str) -> Option<String> {
    let index = text.find(year)?;
    Some(
        INITIAL
            .find_iter(&text[..index])
            .map(|m| m.as_str())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_year_yields_no_keys() {
        assert!(generate_keys("Smith, J. Title.", "", "general").is_empty());
    }

    #[test]
    fn test_reference_and_citation_share_a_key() {
        let reference = generate_keys("Smith, J. (2020). Title.", "", "general");
        let citation = generate_keys("Smith, 2020", "", "general");
        assert!(reference.contains(&"smith2020".to_string()));
        assert!(citation.contains(&"smith2020".to_string()));
    }

    #[test]
    fn test_hyphenated_surname_emits_both_variants() {
        let keys = generate_keys("Mirza-Davies, J. (2015).", "", "general");
        assert!(keys.contains(&"mirza-davies2015".to_string()));
        assert!(keys.contains(&"mirzadavies2015".to_string()));
    }

    #[test]
    fn test_multi_author_keys() {
        let keys = generate_keys("Jones and Smith 2019", "", "general");
        assert_eq!(keys[0], "jonessmith2019");
        assert!(keys.contains(&"smith2019".to_string()));
    }

    #[test]
    fn test_acronym_and_initials() {
        let keys = generate_keys("WHO 2019", "", "general");
        assert!(keys.contains(&"who2019".to_string()));

        let spelled = generate_keys("World Health Organization. 2019. Report.", "", "general");
        assert!(spelled.contains(&"who2019".to_string()));
    }

    #[test]
    fn test_year_only_citation_uses_context() {
        let keys = generate_keys("2018", "as argued by Van Dijk", "general");
        assert!(keys.contains(&"dijkvan2018".to_string()));
        assert!(keys.contains(&"dijk2018".to_string()));
    }

    #[test]
    fn test_bracketed_year() {
        let keys = generate_keys("Marx, K. [1867] 1990. Capital.", "", "general");
        assert!(keys.contains(&"marx1867".to_string()));
    }

    #[test]
    fn test_oup_surname_firstname_exits_early() {
        let keys = generate_keys("Mirza-Davies Jane 2015 Title", "", "oup");
        assert_eq!(
            keys,
            vec!["mirza-davies2015", "mirza-daviesjane2015", "mirzadavies2015"]
        );
    }

    #[test]
    fn test_taylor_francis_citation_ids() {
        let keys = generate_keys("Brown, A. 2011 CIT0061", "", "taylor-francis");
        assert_eq!(keys[0], "cit00612011");
        assert_eq!(keys[1], "citation00612011");
        assert_eq!(keys[2], "brown2011");
    }

    #[test]
    fn test_united_nations_special_case() {
        let keys = generate_keys("United Nations General Assembly. 1948.", "", "general");
        assert!(keys.contains(&"un1948".to_string()));
    }

    #[test]
    fn test_possessive_is_dropped() {
        let keys = generate_keys("Smith's 2001", "", "general");
        assert!(keys.contains(&"smith2001".to_string()));
    }

    #[test]
    fn test_accented_surnames_stay_whole() {
        let reference = generate_keys("García, M. (2018). Título.", "", "general");
        let citation = generate_keys("García, 2018", "", "general");
        assert!(reference.contains(&"garcía2018".to_string()));
        assert!(citation.contains(&"garcía2018".to_string()));

        let keys = generate_keys("Schäfer, T. (2019). Arbeit.", "", "general");
        assert_eq!(keys[0], "schäfer2019");
        assert!(keys.contains(&"st2019".to_string()));
    }

    #[test]
    fn test_accented_context_name() {
        let keys = generate_keys("2020", "as noted by Åström", "general");
        assert!(keys.contains(&"åström2020".to_string()));
    }

    #[test]
    fn test_initials_before() {
        assert_eq!(
            initials_before("World Health Organization (2019) Report", "2019"),
            Some("WHO".to_string())
        );
        assert_eq!(initials_before("World Health Organization (2019)", "2020"), None);
    }
}
