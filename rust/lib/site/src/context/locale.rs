//! Locale and time zone resolution.

use std::sync::OnceLock;

use chrono::{Duration, Utc};

use super::Context;
use crate::tz::TimeZone;

pub const LOCALE_HEADER: &str = "Locale";
pub const LOCALE_COOKIE: &str = "locale";
pub const DEFAULT_LOCALE: &str = "en-US";

const LOCALE_QUERY: &str = "locale";
const TIME_LOCATION_HEADER: &str = "X-Time-Location";
const LOCALE_COOKIE_DAYS: i64 = 365;

impl Context {
    /// Locale of the request, resolved once.
    ///
    /// Order: explicit locale, `Locale` header, `locale` query parameter,
    /// `locale` cookie, site locale, factory default, `en-US`. A locale
    /// taken from the query is persisted in a one-year cookie.
    pub fn locale(&self) -> String {
        self.locale.get_or_init(|| self.resolve_locale()).clone()
    }

    pub fn set_locale(&mut self, locale: &str) {
        self.locale = OnceLock::from(locale.to_string());
    }

    /// Fallback used when the request names no locale.
    pub fn set_default_locale(&mut self, locale: &str) {
        self.default_locale = Some(locale.to_string());
    }

    pub fn default_locale(&self) -> String {
        if let Some(site) = &self.site {
            if !site.config().locale.is_empty() {
                return site.config().locale.clone();
            }
        }
        self.default_locale
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    fn resolve_locale(&self) -> String {
        if let Some(req) = &self.request {
            if let Some(l) = req.header(LOCALE_HEADER).filter(|l| is_locale_tag(l)) {
                return l.to_string();
            }
            if let Some(l) = req.query_param(LOCALE_QUERY).filter(|l| is_locale_tag(l)) {
                if req.cookie(LOCALE_COOKIE).as_deref() != Some(l.as_str()) {
                    self.response.set_cookie(&self.locale_cookie(&l));
                }
                return l;
            }
            if let Some(l) = req.cookie(LOCALE_COOKIE).filter(|l| is_locale_tag(l)) {
                return l;
            }
        }
        self.default_locale()
    }

    fn locale_cookie(&self, locale: &str) -> String {
        let expires = (Utc::now() + Duration::days(LOCALE_COOKIE_DAYS))
            .format("%a, %d %b %Y %H:%M:%S GMT");
        let mut cookie = format!("{LOCALE_COOKIE}={locale}; Path=/; Expires={expires}; HttpOnly");
        if self.is_https() {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub(crate) fn is_https(&self) -> bool {
        match self.header("X-Forwarded-Proto") {
            Some(proto) => proto.eq_ignore_ascii_case("https"),
            None => self.original_url().is_some_and(|u| u.scheme() == "https"),
        }
    }

    /// Translate `key` in the request locale, or `default` when unknown.
    pub fn t(&self, key: &str, default: &str) -> String {
        let Some(translator) = &self.translator else {
            return default.to_string();
        };
        translator
            .translate(&self.locale(), key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Time zone of the request, resolved once: user, `X-Time-Location`
    /// header, site, local.
    pub fn time_zone(&self) -> TimeZone {
        *self.time_zone.get_or_init(|| {
            let from_user = self
                .user
                .as_ref()
                .and_then(|u| u.time_location.as_deref())
                .and_then(TimeZone::from_name);
            from_user
                .or_else(|| self.header(TIME_LOCATION_HEADER).and_then(TimeZone::from_name))
                .or_else(|| self.site.as_ref().map(|s| s.time_zone()))
                .unwrap_or(TimeZone::Local)
        })
    }

    pub fn set_time_zone(&mut self, tz: TimeZone) {
        self.time_zone = OnceLock::from(tz);
    }
}

/// Locales from the request must look like `en`, `pt-BR` or `zh_Hant_TW`;
/// anything else is ignored.
fn is_locale_tag(s: &str) -> bool {
    (1..=35).contains(&s.len())
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestInfo;
    use crate::translator::StaticTranslator;
    use axum::http::{HeaderMap, Method};
    use std::sync::Arc;

    fn ctx(url: &str, headers: &[(&str, &str)]) -> Context {
        let parsed = ::url::Url::parse(url).unwrap();
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        let uri = format!(
            "{}{}",
            parsed.path(),
            parsed.query().map(|q| format!("?{q}")).unwrap_or_default()
        );
        let mut c = Context::new_top(Some(parsed));
        c.set_request(RequestInfo::new(Method::GET, uri.parse().unwrap(), map));
        c
    }

    #[test]
    fn header_wins() {
        let c = ctx("http://x/?locale=fr-FR", &[("Locale", "de-DE"), ("cookie", "locale=pt-BR")]);
        assert_eq!(c.locale(), "de-DE");
        assert!(c.response().headers().is_empty());
    }

    #[test]
    fn query_sets_cookie_once() {
        let c = ctx("https://x/?locale=fr-FR", &[]);
        assert_eq!(c.locale(), "fr-FR");
        assert_eq!(c.locale(), "fr-FR");

        let cookies = c.response().set_cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("locale=fr-FR; Path=/; Expires="));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].ends_with("; Secure"));
    }

    #[test]
    fn malformed_locales_are_ignored() {
        let c = ctx(
            "http://x/?locale=fr%3B%20Domain%3Devil.com%3B%20Max-Age%3D999999999",
            &[("cookie", "locale=pt-BR")],
        );
        assert_eq!(c.locale(), "pt-BR");
        assert!(c.response().set_cookies().is_empty());

        let c = ctx("http://x/", &[("Locale", "de DE"), ("cookie", "locale=x y")]);
        assert_eq!(c.locale(), DEFAULT_LOCALE);

        assert!(is_locale_tag("zh_Hant_TW"));
        assert!(!is_locale_tag(""));
        assert!(!is_locale_tag(&"a".repeat(36)));
    }

    #[test]
    fn cookie_then_default() {
        let c = ctx("http://x/", &[("cookie", "locale=pt-BR")]);
        assert_eq!(c.locale(), "pt-BR");

        let mut c = ctx("http://x/", &[]);
        assert_eq!(c.locale(), DEFAULT_LOCALE);
        c.set_locale("ja-JP");
        assert_eq!(c.locale(), "ja-JP");

        let mut c = ctx("http://x/", &[]);
        c.set_default_locale("es-ES");
        assert_eq!(c.locale(), "es-ES");
    }

    #[test]
    fn translate_with_locale() {
        let t = StaticTranslator::new();
        t.insert("fr", "save", "Enregistrer");
        let mut c = ctx("http://x/?locale=fr-FR", &[]);
        c.set_translator(Arc::new(t));
        assert_eq!(c.t("save", "Save"), "Enregistrer");
        assert_eq!(c.t("cancel", "Cancel"), "Cancel");
    }

    #[test]
    fn time_zone_order() {
        let c = ctx("http://x/", &[("X-Time-Location", "Asia/Tokyo")]);
        assert_eq!(c.time_zone().to_string(), "Asia/Tokyo");

        let mut c = ctx("http://x/", &[("X-Time-Location", "Asia/Tokyo")]);
        c.set_user(openerp_core::Identity {
            time_location: Some("Europe/Paris".into()),
            ..Default::default()
        });
        assert_eq!(c.time_zone().to_string(), "Europe/Paris");

        assert_eq!(ctx("http://x/", &[]).time_zone(), TimeZone::Local);
    }
}
