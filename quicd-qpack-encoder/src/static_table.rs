//! QPACK static table (RFC 9204 Appendix A).
//!
//! 99 predefined entries addressed by 0-based index. The encoder consults it
//! before the dynamic table: a static reference never makes a field section
//! depend on encoder stream state.

use std::collections::HashMap;

/// Static table entry.
#[derive(Debug, Clone, Copy)]
pub struct StaticEntry {
    pub name: &'static [u8],
    pub value: &'static [u8],
}

impl StaticEntry {
    const fn new(name: &'static [u8], value: &'static [u8]) -> Self {
        Self { name, value }
    }
}

pub static STATIC_TABLE: &[StaticEntry] = &[
    StaticEntry::new(b":authority", b""),
    StaticEntry::new(b":path", b"/"),
    StaticEntry::new(b"age", b"0"),
    StaticEntry::new(b"content-disposition", b""),
    StaticEntry::new(b"content-length", b"0"),
    StaticEntry::new(b"cookie", b""),
    StaticEntry::new(b"date", b""),
    StaticEntry::new(b"etag", b""),
    StaticEntry::new(b"if-modified-since", b""),
    StaticEntry::new(b"if-none-match", b""),
    StaticEntry::new(b"last-modified", b""),
    StaticEntry::new(b"link", b""),
    StaticEntry::new(b"location", b""),
    StaticEntry::new(b"referer", b""),
    StaticEntry::new(b"set-cookie", b""),
    StaticEntry::new(b":method", b"CONNECT"),
    StaticEntry::new(b":method", b"DELETE"),
    StaticEntry::new(b":method", b"GET"),
    StaticEntry::new(b":method", b"HEAD"),
    StaticEntry::new(b":method", b"OPTIONS"),
    StaticEntry::new(b":method", b"POST"),
    StaticEntry::new(b":method", b"PUT"),
    StaticEntry::new(b":scheme", b"http"),
    StaticEntry::new(b":scheme", b"https"),
    StaticEntry::new(b":status", b"103"),
    StaticEntry::new(b":status", b"200"),
    StaticEntry::new(b":status", b"304"),
    StaticEntry::new(b":status", b"404"),
    StaticEntry::new(b":status", b"503"),
    StaticEntry::new(b"accept", b"*/*"),
    StaticEntry::new(b"accept", b"application/dns-message"),
    StaticEntry::new(b"accept-encoding", b"gzip, deflate, br"),
    StaticEntry::new(b"accept-ranges", b"bytes"),
    StaticEntry::new(b"access-control-allow-headers", b"cache-control"),
    StaticEntry::new(b"access-control-allow-headers", b"content-type"),
    StaticEntry::new(b"access-control-allow-origin", b"*"),
    StaticEntry::new(b"cache-control", b"max-age=0"),
    StaticEntry::new(b"cache-control", b"max-age=2592000"),
    StaticEntry::new(b"cache-control", b"max-age=604800"),
    StaticEntry::new(b"cache-control", b"no-cache"),
    StaticEntry::new(b"cache-control", b"no-store"),
    StaticEntry::new(b"cache-control", b"public, max-age=31536000"),
    StaticEntry::new(b"content-encoding", b"br"),
    StaticEntry::new(b"content-encoding", b"gzip"),
    StaticEntry::new(b"content-type", b"application/dns-message"),
    StaticEntry::new(b"content-type", b"application/javascript"),
    StaticEntry::new(b"content-type", b"application/json"),
    StaticEntry::new(b"content-type", b"application/x-www-form-urlencoded"),
    StaticEntry::new(b"content-type", b"image/gif"),
    StaticEntry::new(b"content-type", b"image/jpeg"),
    StaticEntry::new(b"content-type", b"image/png"),
    StaticEntry::new(b"content-type", b"text/css"),
    StaticEntry::new(b"content-type", b"text/html; charset=utf-8"),
    StaticEntry::new(b"content-type", b"text/plain"),
    StaticEntry::new(b"content-type", b"text/plain;charset=utf-8"),
    StaticEntry::new(b"range", b"bytes=0-"),
    StaticEntry::new(b"strict-transport-security", b"max-age=31536000"),
    StaticEntry::new(b"strict-transport-security", b"max-age=31536000; includesubdomains"),
    StaticEntry::new(b"strict-transport-security", b"max-age=31536000; includesubdomains; preload"),
    StaticEntry::new(b"vary", b"accept-encoding"),
    StaticEntry::new(b"vary", b"origin"),
    StaticEntry::new(b"x-content-type-options", b"nosniff"),
    StaticEntry::new(b"x-xss-protection", b"1; mode=block"),
    StaticEntry::new(b":status", b"100"),
    StaticEntry::new(b":status", b"204"),
    StaticEntry::new(b":status", b"206"),
    StaticEntry::new(b":status", b"302"),
    StaticEntry::new(b":status", b"400"),
    StaticEntry::new(b":status", b"403"),
    StaticEntry::new(b":status", b"421"),
    StaticEntry::new(b":status", b"425"),
    StaticEntry::new(b":status", b"500"),
    StaticEntry::new(b"accept-language", b""),
    StaticEntry::new(b"access-control-allow-credentials", b"FALSE"),
    StaticEntry::new(b"access-control-allow-credentials", b"TRUE"),
    StaticEntry::new(b"access-control-allow-headers", b"*"),
    StaticEntry::new(b"access-control-allow-methods", b"get"),
    StaticEntry::new(b"access-control-allow-methods", b"get, post, options"),
    StaticEntry::new(b"access-control-allow-methods", b"options"),
    StaticEntry::new(b"access-control-expose-headers", b"content-length"),
    StaticEntry::new(b"access-control-request-headers", b"content-type"),
    StaticEntry::new(b"access-control-request-method", b"get"),
    StaticEntry::new(b"access-control-request-method", b"post"),
    StaticEntry::new(b"alt-svc", b"clear"),
    StaticEntry::new(b"authorization", b""),
    StaticEntry::new(b"content-security-policy", b"script-src 'none'; object-src 'none'; base-uri 'none'"),
    StaticEntry::new(b"early-data", b"1"),
    StaticEntry::new(b"expect-ct", b""),
    StaticEntry::new(b"forwarded", b""),
    StaticEntry::new(b"if-range", b""),
    StaticEntry::new(b"origin", b""),
    StaticEntry::new(b"purpose", b"prefetch"),
    StaticEntry::new(b"server", b""),
    StaticEntry::new(b"timing-allow-origin", b"*"),
    StaticEntry::new(b"upgrade-insecure-requests", b"1"),
    StaticEntry::new(b"user-agent", b""),
    StaticEntry::new(b"x-forwarded-for", b""),
    StaticEntry::new(b"x-frame-options", b"deny"),
    StaticEntry::new(b"x-frame-options", b"sameorigin"),
];

/// Result of a static table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticMatch {
    /// Name and value both match the entry at this index.
    Exact(u64),
    /// Only the name matches; the index is the first entry with that name.
    Name(u64),
}

/// Entries grouped by name, in table order.
struct Lookup {
    by_name: HashMap<&'static [u8], Vec<(&'static [u8], u64)>>,
}

impl Lookup {
    fn build() -> Self {
        let mut by_name: HashMap<&'static [u8], Vec<(&'static [u8], u64)>> = HashMap::new();
        for (idx, entry) in STATIC_TABLE.iter().enumerate() {
            by_name
                .entry(entry.name)
                .or_default()
                .push((entry.value, idx as u64));
        }
        Self { by_name }
    }
}

lazy_static::lazy_static! {
    static ref LOOKUP: Lookup = Lookup::build();
}

/// Looks up a field, preferring an exact match over a name match.
pub fn lookup(name: &[u8], value: &[u8]) -> Option<StaticMatch> {
    find_exact(name, value)
        .map(StaticMatch::Exact)
        .or_else(|| find_name(name).map(StaticMatch::Name))
}

/// Index of the entry matching both name and value.
#[inline]
pub fn find_exact(name: &[u8], value: &[u8]) -> Option<u64> {
    LOOKUP
        .by_name
        .get(name)?
        .iter()
        .find(|(v, _)| *v == value)
        .map(|&(_, idx)| idx)
}

/// Index of the first entry with this name.
#[inline]
pub fn find_name(name: &[u8]) -> Option<u64> {
    LOOKUP.by_name.get(name)?.first().map(|&(_, idx)| idx)
}

#[inline]
pub fn get(index: u64) -> Option<&'static StaticEntry> {
    STATIC_TABLE.get(usize::try_from(index).ok()?)
}
