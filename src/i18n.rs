/*
Simple i18n helper for the service.

This module provides:
- A tiny embedded translations store for RU/EN (compile-time embedded JSON).
- A `tr` function to lookup translations by key + optional params.
- `t` / `t_with` convenience wrappers using the default language (DEFAULT_LANG).

Usage:
    use crate::i18n;
    let msg = i18n::t("notification.requeued");
    let text = i18n::tr(Some("en"), "messages.booking_1h", Some(&[("room", "Blue room"), ("start", "10:00"), ("end", "11:00")]));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `ru`. If a key is missing for the requested language,
  the fallback language will be used.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "ru";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const RU_JSON: &str = r#"
{
  "messages.booking_24h": "⏰ Напоминание: завтра, {date} в {start}, у вас бронь «{room}» (до {end}).",
  "messages.booking_1h": "⏰ Через час, в {start}, начинается ваша бронь «{room}» (до {end}).",
  "messages.booking_start": "▶️ Ваша бронь «{room}» началась и продлится до {end}.",
  "messages.booking_end": "⏹ Ваша бронь «{room}» завершилась в {end}. Спасибо!",
  "messages.booking_cancel": "❌ Бронь «{room}» на {date} {start}–{end} отменена.",
  "messages.feedback_request": "⭐ Как прошла ваша бронь «{room}» {date}? Пожалуйста, оставьте отзыв.",
  "messages.address_line": "📍 {address}",
  "not_found.notification": "Уведомление {id} не найдено",
  "not_found.booking": "Бронь {id} не найдена",
  "conflict.booking_cancelled": "Бронь {id} отменена",
  "conflict.notification_not_failed": "Повторно поставить в очередь можно только уведомление со статусом failed",
  "bad_request.invalid_status": "Неизвестный статус: {status}",
  "bad_request.invalid_page": "Недопустимый номер страницы: {page}",
  "notification.requeued": "Уведомление снова поставлено в очередь",
  "app.name": "Бронирование"
}
"#;

const EN_JSON: &str = r#"
{
  "messages.booking_24h": "⏰ Reminder: tomorrow, {date} at {start}, you have booked \"{room}\" (until {end}).",
  "messages.booking_1h": "⏰ Your booking of \"{room}\" starts in one hour, at {start} (until {end}).",
  "messages.booking_start": "▶️ Your booking of \"{room}\" has started and lasts until {end}.",
  "messages.booking_end": "⏹ Your booking of \"{room}\" ended at {end}. Thank you!",
  "messages.booking_cancel": "❌ Your booking of \"{room}\" on {date} {start}–{end} has been cancelled.",
  "messages.feedback_request": "⭐ How was your booking of \"{room}\" on {date}? Please leave a review.",
  "messages.address_line": "📍 {address}",
  "not_found.notification": "Notification {id} not found",
  "not_found.booking": "Booking {id} not found",
  "conflict.booking_cancelled": "Booking {id} is cancelled",
  "conflict.notification_not_failed": "Only failed notifications can be re-queued",
  "bad_request.invalid_status": "Unknown status: {status}",
  "bad_request.invalid_page": "Page out of range: {page}",
  "notification.requeued": "Notification re-queued",
  "app.name": "Booking"
}
"#;

/// Initialize translations map (lazy).
fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    // Parse RU
    let ru_map: HashMap<String, String> = serde_json::from_str(RU_JSON).unwrap_or_else(|e| {
        panic!("failed to parse RU_JSON in i18n module: {}", e);
    });
    out.insert("ru".to_string(), ru_map);

    // Parse EN
    let en_map: HashMap<String, String> = serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse EN_JSON in i18n module: {}", e);
    });
    out.insert("en".to_string(), en_map);

    out
}

/// Returns the global translations map (lang -> (key -> message)).
fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).to_lowercase()
}

/// Returns true if the given language code is supported (e.g. "ru", "en").
pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Returns true if the key exists in the default catalogue.
pub fn has_key(key: &str) -> bool {
    translations()
        .get(DEFAULT_LANG)
        .is_some_and(|m| m.contains_key(key))
}

/// Translate a key using an explicit language (or default if None).
///
/// If no translation is found, returns the default language value or the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        .unwrap_or_else(|| key.to_string());

    match params {
        Some(params) => substitute(&val, params),
        None => val,
    }
}

/// Expand `{name}` placeholders in one pass; substituted values are not rescanned.
fn substitute(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Convenience wrapper: translate using default language (DEFAULT_LANG).
pub fn t(key: &str) -> String {
    tr(None, key, None)
}

/// Convenience wrapper with params (default language).
pub fn t_with(key: &str, params: &[(&str, &str)]) -> String {
    tr(None, key, Some(params))
}
