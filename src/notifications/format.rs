//! Rendering of records into chat messages

use url::Url;

use crate::models::Record;
use crate::utils::truncate_text;

use super::Action;

/// Label of the button linking to the full posting
pub const DETAILS_LABEL: &str = "📌 Details";

/// Descriptions are cut so the message stays under the 4096 character chat limit
pub const MAX_DESCRIPTION_CHARS: usize = 3000;

/// HTML text plus link buttons ready for a [`Notifier`](super::Notifier)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub actions: Vec<Action>,
}

/// Render a record as an HTML message
///
/// Every field is escaped, so scraped text can never inject markup.
pub fn render(record: &Record) -> Message {
    let text = format!(
        "<b>{}</b>\n\n\
         Company: {}\n\
         Salary: {}\n\
         Location: {}\n\
         Experience: {}\n\
         Date: {}\n\n\
         Description:\n{}\n",
        escape(&record.title),
        escape(&record.organization),
        escape(&record.compensation),
        escape(&record.location),
        escape(&record.experience_level),
        record.observed_at.format("%Y-%m-%d %H:%M UTC"),
        escape(&truncate_text(&record.description, MAX_DESCRIPTION_CHARS)),
    );

    // Chat buttons only take absolute web links
    let link = record.link.trim();
    let actions = match Url::parse(link) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            vec![Action::link(DETAILS_LABEL, link)]
        }
        _ => Vec::new(),
    };

    Message { text, actions }
}

fn escape(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}
