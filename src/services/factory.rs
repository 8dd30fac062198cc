//! Pure rendering of notification texts.
//!
//! Nothing here touches the database or the network: the scheduler loads the
//! booking snapshot and the recipient's language, then asks for the text.

use chrono::NaiveDateTime;

use crate::db::{BookingDetails, NotificationKind};
use crate::error::NotificationError;
use crate::i18n;

const DATE_FORMAT: &str = "%d.%m.%Y";
const TIME_FORMAT: &str = "%H:%M";

/// Pick a supported catalogue language from a stored preference.
fn resolve_lang(lang: Option<&str>) -> Option<String> {
    lang.map(i18n::normalize_language)
        .filter(|l| i18n::is_supported_language(l))
}

fn format_end(start: NaiveDateTime, end: NaiveDateTime) -> String {
    if start.date() == end.date() {
        end.format(TIME_FORMAT).to_string()
    } else {
        end.format("%d.%m.%Y %H:%M").to_string()
    }
}

fn render_key(key: &str, booking: &BookingDetails, lang: Option<&str>) -> String {
    let lang = resolve_lang(lang);
    let date = booking.start_time.format(DATE_FORMAT).to_string();
    let start = booking.start_time.format(TIME_FORMAT).to_string();
    let end = format_end(booking.start_time, booking.end_time);

    let mut text = i18n::tr(
        lang.as_deref(),
        key,
        Some(&[
            ("room", booking.room_name.as_str()),
            ("date", date.as_str()),
            ("start", start.as_str()),
            ("end", end.as_str()),
        ]),
    );

    if let Some(address) = booking.room_address.as_deref().filter(|a| !a.trim().is_empty()) {
        text.push('\n');
        text.push_str(&i18n::tr(
            lang.as_deref(),
            "messages.address_line",
            Some(&[("address", address)]),
        ));
    }

    text
}

/// Render the message for a stored notification kind.
///
/// An unknown kind is a data-integrity defect and yields `UnsupportedKind`
/// instead of an empty or placeholder text.
pub fn render(
    kind: &str,
    booking: &BookingDetails,
    lang: Option<&str>,
) -> Result<String, NotificationError> {
    let kind = NotificationKind::from_str(kind)
        .ok_or_else(|| NotificationError::UnsupportedKind(kind.to_string()))?;

    let key = format!("messages.{}", kind.as_str());
    if !i18n::has_key(&key) {
        return Err(NotificationError::UnsupportedKind(kind.as_str().to_string()));
    }

    Ok(render_key(&key, booking, lang))
}

/// Text of the post-booking feedback request.
pub fn render_feedback_request(booking: &BookingDetails, lang: Option<&str>) -> String {
    render_key("messages.feedback_request", booking, lang)
}
