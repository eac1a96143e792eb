//! Server-rendered viewer page.

use tera::{Context as TeraContext, Tera};
use time::OffsetDateTime;

use crate::error::ViewerError;
use crate::session::SessionStore;
use crate::view::NO_BOXES_MESSAGE;

const VIEWER_TEMPLATE: &str = include_str!("../templates/viewer.html.tera");

/// Render the page for the current session state.
pub fn render_page(session: &SessionStore, max_upload_bytes: usize) -> Result<String, ViewerError> {
    let snapshot = session.snapshot();
    let image_url = session
        .with_cycle(|c| c.result.image_data_url())
        .unwrap_or_default();

    let mut context = TeraContext::new();
    context.insert("busy", &snapshot.busy);
    context.insert("notice", &snapshot.notice);
    context.insert("result", &snapshot.result);
    context.insert("image_url", &image_url);
    context.insert("max_upload_mb", &(max_upload_bytes / (1024 * 1024)));
    context.insert("no_boxes_message", NO_BOXES_MESSAGE);
    Ok(Tera::one_off(VIEWER_TEMPLATE, &context, true)?)
}

/// Attachment name for the downloaded text, dated today (UTC).
pub fn download_filename() -> String {
    download_filename_on(OffsetDateTime::now_utc().date())
}

fn download_filename_on(date: time::Date) -> String {
    format!(
        "ocr-result-{:04}-{:02}-{:02}.txt",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
