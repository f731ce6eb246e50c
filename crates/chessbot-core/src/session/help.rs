//! Static help notice.

use chessbot_types::event::MessageContent;

/// The `help` reply, also sent for unknown commands.
///
/// The source-code link is only added when one is configured.
pub fn help_content(version: &str, source_url: Option<&str>) -> MessageContent {
    let mut body = format!(
        "COMMANDS:\n\
         * new -- start a new game of chess\n\
         * help -- show this help\n\
         \n\
         Version {version}."
    );
    let mut html = format!(
        "<b>COMMANDS:</b>\n\
         <ul>\n\
         <li><b>new</b> &mdash; start a new game of chess</li>\n\
         <li><b>help</b> &mdash; show this help</li>\n\
         </ul>\n\
         \n\
         Version {version}."
    );
    if let Some(url) = source_url {
        body.push_str(&format!(" Source code: {url}"));
        html.push_str(&format!(" <a href=\"{url}\">Source code</a>."));
    }
    MessageContent::Notice {
        body,
        formatted_body: Some(html),
    }
}
