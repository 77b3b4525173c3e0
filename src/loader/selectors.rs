//! CSS selectors for the hh.ru search results layout
//!
//! Listing markup changes without notice, so every field carries an
//! ordered list of candidates: stable `data-qa` attributes first, hashed
//! class names as fallback.

use lazy_static::lazy_static;
use scraper::{ElementRef, Selector};

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    pub static ref VACANCY_CARD: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa~="vacancy-serp__vacancy"]"#),
        parse_selector!("main.vacancy-serp-content div.vacancy-info--ieHKDTkezpEj0Gsx"),
        parse_selector!("div.vacancy-info--ieHKDTkezpEj0Gsx"),
    ];

    pub static ref TITLE: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="serp-item__title"]"#),
        parse_selector!(r#"a[data-qa*="serp-item__title"]"#),
    ];

    /// Anchor nested inside a title that is not itself a link
    pub static ref LINK: Vec<Selector> = vec![parse_selector!("a[href]")];

    pub static ref COMPENSATION: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="vacancy-serp__vacancy-compensation"]"#),
        parse_selector!(".compensation-labels--vwum2s12fQUurc2J"),
    ];

    pub static ref EXPERIENCE: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa*="vacancy-serp__vacancy-work-experience"]"#),
    ];

    pub static ref EMPLOYER: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="vacancy-serp__vacancy-employer-text"]"#),
        parse_selector!(r#"[data-qa="vacancy-serp__vacancy-employer"]"#),
    ];

    pub static ref ADDRESS: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="vacancy-serp__vacancy-address"]"#),
    ];

    pub static ref METRO: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="address-metro-station-name"]"#),
    ];

    pub static ref RESPONSIBILITY: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="vacancy-serp__vacancy_snippet_responsibility"]"#),
    ];

    pub static ref REQUIREMENT: Vec<Selector> = vec![
        parse_selector!(r#"[data-qa="vacancy-serp__vacancy_snippet_requirement"]"#),
    ];
}

/// First element matched by the first selector that matches anything
pub fn select_first<'a>(scope: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .find_map(|selector| scope.select(selector).next())
}

/// All elements matched by the first selector that matches anything
pub fn select_all<'a>(scope: ElementRef<'a>, selectors: &[Selector]) -> Vec<ElementRef<'a>> {
    selectors
        .iter()
        .map(|selector| scope.select(selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_selectors_parse() {
        assert_eq!(VACANCY_CARD.len(), 3);
        assert_eq!(TITLE.len(), 2);
        assert!(!COMPENSATION.is_empty());
        assert!(!REQUIREMENT.is_empty());
    }

    #[test]
    fn test_fallback_order() {
        let html = Html::parse_fragment(
            r#"<div>
                <span class="compensation-labels--vwum2s12fQUurc2J">fallback</span>
                <span data-qa="vacancy-serp__vacancy-compensation">primary</span>
            </div>"#,
        );
        let found = select_first(html.root_element(), &COMPENSATION).unwrap();
        assert_eq!(found.text().collect::<String>(), "primary");

        let html = Html::parse_fragment(
            r#"<div><span class="compensation-labels--vwum2s12fQUurc2J">fallback</span></div>"#,
        );
        let found = select_first(html.root_element(), &COMPENSATION).unwrap();
        assert_eq!(found.text().collect::<String>(), "fallback");
    }

    #[test]
    fn test_select_all_cards() {
        let html = Html::parse_fragment(
            r#"<div>
                <div data-qa="vacancy-serp__vacancy vacancy-serp__vacancy_standard">a</div>
                <div data-qa="vacancy-serp__vacancy">b</div>
            </div>"#,
        );
        assert_eq!(select_all(html.root_element(), &VACANCY_CARD).len(), 2);
    }
}
