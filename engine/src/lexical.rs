//! Features computed from the URL text alone. Everything here is pure: no
//! network access, no clock, same input gives the same output.

use crate::{parser::ParsedUrl, types::LexicalFeatures};
use once_cell::sync::Lazy;
use std::collections::HashSet;

// URL shortening services. Matched against the host and each of its parent
// domains, never as a substring of the URL.
const SHORTENING_SERVICES: &[&str] = &[
    "bit.ly", "goo.gl", "shorte.st", "go2l.ink", "x.co", "ow.ly", "t.co", "tinyurl.com",
    "tr.im", "is.gd", "cli.gs", "yfrog.com", "migre.me", "ff.im", "tiny.cc", "url4.eu",
    "twit.ac", "su.pr", "twurl.nl", "snipurl.com", "short.to", "budurl.com", "ping.fm",
    "post.ly", "just.as", "bkite.com", "snipr.com", "fic.kr", "loopt.us", "doiop.com",
    "short.ie", "kl.am", "wp.me", "rubyurl.com", "om.ly", "to.ly", "bit.do", "lnkd.in",
    "db.tt", "qr.ae", "adf.ly", "bitly.com", "cur.lv", "ity.im", "q.gs", "po.st", "bc.vc",
    "twitthis.com", "u.to", "j.mp", "buzurl.com", "cutt.us", "u.bb", "yourls.org",
    "prettylinkpro.com", "scrnch.me", "filoops.info", "vzturl.com", "qr.net", "1url.com",
    "tweez.me", "v.gd", "link.zip.net", "rebrandly.com", "rebrand.ly", "t2m.io", "bl.ink",
    "shrtco.de", "cutt.ly", "shorte.link", "rb.gy", "soo.gd", "v.ht", "l9.nu", "gg.gg",
    "tny.im", "clck.ru", "buff.ly", "shorturl.at", "s.id", "t.ly", "tiny.one", "urlzs.com",
    "hyperurl.co",
];

// Public suffixes commonly abused for phishing, including cheap generic gTLDs
// and a handful of second-level suffixes seen in phishing feeds.
const SUSPICIOUS_TLDS: &[&str] = &[
    "fit", "tk", "gp", "ga", "work", "ml", "date", "wang", "men", "icu", "online", "click",
    "country", "stream", "download", "xin", "racing", "jetzt", "ren", "mom", "party",
    "review", "trade", "accountants", "science", "ninja", "xyz", "faith", "zip", "cricket",
    "win", "accountant", "realtor", "top", "christmas", "gdn", "link", "asia", "club", "la",
    "ae", "exposed", "pe", "go.id", "rs", "k12.pa.us", "or.kr", "ce.ke", "audio", "gob.pe",
    "gov.az", "website", "bj", "mx", "media", "sa.gov.au", "cf", "gq", "loan", "bid",
    "webcam", "kim", "space", "buzz", "monster", "cyou", "rest", "quest", "cfd", "sbs",
    "hair", "makeup", "boats", "beauty", "bar", "lol", "bond", "uno", "mov", "nexus", "surf",
    "cam", "pw", "cc", "su", "ws", "biz", "info", "site", "live", "fun", "host", "press",
    "tokyo", "support", "help", "services", "digital", "email", "life", "world", "today",
    "store", "shop", "vip", "best", "cool", "fyi", "guru", "rocks", "pics", "pink", "red",
    "blue", "black", "kiwi", "ooo", "tech", "solutions", "center", "zone", "network",
    "group", "agency", "company", "business", "money", "finance", "loans", "credit",
    "gift", "gifts", "casa", "ink", "wiki", "fans", "games", "bet", "poker", "porn", "sex",
    "adult", "dating", "sexy", "tattoo", "xxx", "cn", "ru", "to", "nu", "cm", "cd",
    "ng", "ke", "ug", "tz", "zw", "pk", "vn", "id",
];

static SHORTENERS: Lazy<HashSet<&'static str>> = Lazy::new(|| SHORTENING_SERVICES.iter().copied().collect());
static SUSPICIOUS: Lazy<HashSet<&'static str>> = Lazy::new(|| SUSPICIOUS_TLDS.iter().copied().collect());

pub fn extract(parsed: &ParsedUrl) -> LexicalFeatures {
    let url = parsed.url.as_str();
    LexicalFeatures {
        url_length: url_length(url),
        domain_length: domain_length(parsed),
        path_depth: path_depth(&parsed.path),
        nb_subdomains: nb_subdomains(&parsed.subdomain),
        https_in_hostname: https_in_hostname(parsed),
        shortened_url: shortened_url(parsed),
        abnormal_subdomain: abnormal_subdomain(&parsed.subdomain),
        suspicious_tld: suspicious_tld(&parsed.suffix),
        is_ip: flag(parsed.is_ip_literal),
        is_http: flag(parsed.scheme == "http"),
        has_at: flag(url.contains('@')),
        has_dash: flag(parsed.authority.contains('-')),
        has_double_slash: has_double_slash(url),
        nb_equals: count_char(url, '='),
        nb_question_mark: count_char(url, '?'),
    }
}

fn flag(value: bool) -> i64 {
    i64::from(value)
}

fn count_char(text: &str, needle: char) -> i64 {
    text.chars().filter(|c| *c == needle).count() as i64
}

pub fn url_length(url: &str) -> i64 {
    url.chars().count() as i64
}

pub fn domain_length(parsed: &ParsedUrl) -> i64 {
    parsed.domain.chars().count() as i64
}

pub fn path_depth(path: &str) -> i64 {
    path.split('/').filter(|segment| !segment.trim().is_empty()).count() as i64
}

/// An empty subdomain still counts as one (empty) label.
pub fn nb_subdomains(subdomain: &str) -> i64 {
    subdomain.split('.').count() as i64
}

pub fn https_in_hostname(parsed: &ParsedUrl) -> i64 {
    flag(parsed.authority.to_ascii_lowercase().contains("https"))
}

pub fn shortened_url(parsed: &ParsedUrl) -> i64 {
    let host = parsed.hostname.to_ascii_lowercase();
    let mut candidate = host.as_str();
    loop {
        if SHORTENERS.contains(candidate) {
            return 1;
        }
        match candidate.split_once('.') {
            Some((_, parent)) if parent.contains('.') => candidate = parent,
            _ => return 0,
        }
    }
}

/// `ww` + non-`w`, `www` + non-dot, `wwww`, or a leading digit.
pub fn abnormal_subdomain(subdomain: &str) -> i64 {
    let bytes = subdomain.to_ascii_lowercase().into_bytes();
    let abnormal = match bytes.as_slice() {
        [first, ..] if first.is_ascii_digit() => true,
        [b'w', b'w', b'w', b'w', ..] => true,
        [b'w', b'w', b'w', next, ..] => *next != b'.',
        [b'w', b'w', next, ..] => *next != b'w',
        _ => false,
    };
    flag(abnormal)
}

pub fn suspicious_tld(suffix: &str) -> i64 {
    flag(SUSPICIOUS.contains(suffix.to_ascii_lowercase().as_str()))
}

/// A `//` anywhere after the scheme separator.
pub fn has_double_slash(url: &str) -> i64 {
    flag(url.rfind("//").is_some_and(|position| position > 6))
}
