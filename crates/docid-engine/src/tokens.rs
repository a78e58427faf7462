//! Token maps for rendering a document type's identifiers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use docid_core::period::{month_token, year_token};
use docid_core::template::{self, pad_counter, COUNTER_TOKEN};
use docid_core::{CompanySettings, DocumentTypeConfig, TokenMap};

/// Caller-supplied tokens, keyed `NAME` or `{{NAME}}` in any case.
pub type ExtraTokens = BTreeMap<String, String>;

/// Build the token map for one generation.
///
/// Precedence, lowest first: built-ins, the document type's custom tokens,
/// caller extras. `{{COUNTER}}` is never taken from the map; see
/// [`render_id`].
#[must_use]
pub fn token_map(
    config: &DocumentTypeConfig,
    settings: &CompanySettings,
    today: NaiveDate,
    extras: &ExtraTokens,
) -> TokenMap {
    let mut tokens = TokenMap::new();
    tokens
        .set("COMPANY", settings.company_code.as_str())
        .set("BRANCH", settings.branch_code.as_str())
        .set("DEPT", settings.department_code.as_str())
        .set("PREFIX", config.prefix.as_str())
        .set("YEAR", year_token(config, settings, today))
        .set("MONTH", month_token(today))
        .set("REF", config.ref_number.clone().unwrap_or_default());
    tokens.extend(&config.custom_tokens);
    tokens.extend(extras);
    tokens
}

/// Render an identifier for `counter` with the configured padding.
#[must_use]
pub fn render_id(config: &DocumentTypeConfig, tokens: &TokenMap, counter: u64) -> String {
    let tokens = tokens
        .clone()
        .with(COUNTER_TOKEN, pad_counter(counter, config.padding));
    template::render(&config.format_template, &tokens, &config.separator)
}
