//! Case-insensitive header access and quota header parsing.

// std
use std::hash::BuildHasher;
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Per-second capacity advertised by the server.
pub const LIMIT_PER_SECOND: &str = "x-limit-per-second";
/// Calls left in the current second.
pub const REMAINING_THIS_SECOND: &str = "x-remaining-this-second";
/// Daily capacity advertised by the server.
pub const LIMIT_PER_DAY: &str = "x-limit-per-day";
/// Calls left in the current UTC day.
pub const REMAINING_TODAY: &str = "x-remaining-today";
/// Standard retry hint (delta-seconds or HTTP date).
pub const RETRY_AFTER: &str = "retry-after";

/// Read access to response headers with ASCII case-insensitive names.
pub trait HeaderLookup {
	/// Value of the header called `name`, ignoring ASCII case.
	fn header(&self, name: &str) -> Option<&str>;
}
impl<T> HeaderLookup for &T
where
	T: ?Sized + HeaderLookup,
{
	fn header(&self, name: &str) -> Option<&str> {
		(**self).header(name)
	}
}
impl<S> HeaderLookup for HashMap<String, String, S>
where
	S: BuildHasher,
{
	fn header(&self, name: &str) -> Option<&str> {
		self.get(name)
			.or_else(|| self.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
			.map(String::as_str)
	}
}
impl HeaderLookup for BTreeMap<String, String> {
	fn header(&self, name: &str) -> Option<&str> {
		self.get(name)
			.or_else(|| self.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
			.map(String::as_str)
	}
}
impl<K, V> HeaderLookup for [(K, V)]
where
	K: AsRef<str>,
	V: AsRef<str>,
{
	fn header(&self, name: &str) -> Option<&str> {
		self.iter().find(|(k, _)| k.as_ref().eq_ignore_ascii_case(name)).map(|(_, v)| v.as_ref())
	}
}
impl<K, V, const N: usize> HeaderLookup for [(K, V); N]
where
	K: AsRef<str>,
	V: AsRef<str>,
{
	fn header(&self, name: &str) -> Option<&str> {
		self.as_slice().header(name)
	}
}
impl<K, V> HeaderLookup for Vec<(K, V)>
where
	K: AsRef<str>,
	V: AsRef<str>,
{
	fn header(&self, name: &str) -> Option<&str> {
		self.as_slice().header(name)
	}
}
#[cfg(feature = "reqwest")]
impl HeaderLookup for reqwest::header::HeaderMap {
	fn header(&self, name: &str) -> Option<&str> {
		self.get(name)?.to_str().ok()
	}
}

/// Owned header collection keyed by lowercase name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBag(BTreeMap<String, String>);
impl HeaderBag {
	/// Creates an empty bag.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a header, returning the value it replaced.
	pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
		self.0.insert(name.as_ref().to_ascii_lowercase(), value.into())
	}

	/// Builder-style [`insert`](Self::insert).
	pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.insert(name, value);

		self
	}

	/// Number of stored headers.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no headers are stored.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterator over `(lowercase name, value)` pairs.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}
}
impl HeaderLookup for HeaderBag {
	fn header(&self, name: &str) -> Option<&str> {
		if name.bytes().any(|b| b.is_ascii_uppercase()) {
			self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
		} else {
			self.0.get(name).map(String::as_str)
		}
	}
}
impl<K, V> FromIterator<(K, V)> for HeaderBag
where
	K: AsRef<str>,
	V: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		let mut bag = Self::new();

		for (name, value) in iter {
			bag.insert(name, value);
		}

		bag
	}
}
#[cfg(feature = "reqwest")]
impl From<&reqwest::header::HeaderMap> for HeaderBag {
	fn from(map: &reqwest::header::HeaderMap) -> Self {
		map.iter()
			.filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v.to_owned())))
			.collect()
	}
}

/// Quota fields parsed from a single response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct QuotaHeaders {
	pub(crate) limit_per_second: Option<u64>,
	pub(crate) remaining_this_second: Option<u64>,
	pub(crate) limit_per_day: Option<u64>,
	pub(crate) remaining_today: Option<u64>,
}
impl QuotaHeaders {
	pub(crate) fn read<H>(headers: &H) -> Self
	where
		H: ?Sized + HeaderLookup,
	{
		Self {
			limit_per_second: quota_value(headers, LIMIT_PER_SECOND),
			remaining_this_second: quota_value(headers, REMAINING_THIS_SECOND),
			limit_per_day: quota_value(headers, LIMIT_PER_DAY),
			remaining_today: quota_value(headers, REMAINING_TODAY),
		}
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.limit_per_second.is_none()
			&& self.remaining_this_second.is_none()
			&& self.limit_per_day.is_none()
			&& self.remaining_today.is_none()
	}
}

/// Parses a `retry-after` value given as delta-seconds (integer or fractional) or an HTTP date.
///
/// Dates in the past resolve to zero. Unparseable values yield `None`.
pub fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(secs) = raw.parse::<f64>() {
		return (secs.is_finite() && secs >= 0.).then(|| Duration::seconds_f64(secs.min(1e12)));
	}

	let moment = OffsetDateTime::parse(raw, &Rfc2822).ok().or_else(|| {
		let numeric = raw.strip_suffix(" GMT").map(|head| format!("{head} +0000"))?;

		OffsetDateTime::parse(&numeric, &Rfc2822).ok()
	})?;
	let delta = moment - now;

	Some(if delta.is_negative() { Duration::ZERO } else { delta })
}

fn quota_value<H>(headers: &H, name: &'static str) -> Option<u64>
where
	H: ?Sized + HeaderLookup,
{
	let raw = headers.header(name)?.trim();

	if let Ok(value) = raw.parse::<i64>() {
		return Some(value.max(0) as u64);
	}

	match raw.parse::<f64>() {
		Ok(value) if value.is_finite() => Some(value.max(0.).trunc() as u64),
		_ => {
			obs_warn!(header = name, value = raw, "Ignoring non-numeric rate limit header.");

			None
		},
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn lookups_ignore_ascii_case() {
		let mut map = HashMap::new();

		map.insert("X-Remaining-Today".to_owned(), "12".to_owned());

		assert_eq!(map.header(REMAINING_TODAY), Some("12"));
		assert_eq!([("X-LIMIT-PER-DAY", "100")].header(LIMIT_PER_DAY), Some("100"));
		assert_eq!(HeaderBag::new().with("Retry-After", "3").header("RETRY-after"), Some("3"));
		assert_eq!(BTreeMap::<String, String>::new().header(RETRY_AFTER), None);
	}

	#[test]
	fn quota_headers_clamp_and_skip_garbage() {
		let headers = [
			(LIMIT_PER_SECOND, "ten"),
			(REMAINING_THIS_SECOND, "-4"),
			(LIMIT_PER_DAY, " 100000 "),
			(REMAINING_TODAY, "15000.0"),
		];
		let parsed = QuotaHeaders::read(&headers);

		assert_eq!(parsed.limit_per_second, None);
		assert_eq!(parsed.remaining_this_second, Some(0));
		assert_eq!(parsed.limit_per_day, Some(100_000));
		assert_eq!(parsed.remaining_today, Some(15_000));
		assert!(!parsed.is_empty());
		assert!(QuotaHeaders::read(&[(LIMIT_PER_DAY, "n/a")]).is_empty());
	}

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);

		assert_eq!(parse_retry_after("7", now), Some(Duration::seconds(7)));
		assert_eq!(parse_retry_after("1.5", now), Some(Duration::milliseconds(1_500)));
		assert_eq!(
			parse_retry_after("Mon, 10 Nov 2025 12:00:30 +0000", now),
			Some(Duration::seconds(30))
		);
		assert_eq!(
			parse_retry_after("Mon, 10 Nov 2025 12:01:00 GMT", now),
			Some(Duration::MINUTE)
		);
		assert_eq!(parse_retry_after("Mon, 10 Nov 2025 11:00:00 +0000", now), Some(Duration::ZERO));
		assert_eq!(parse_retry_after("-3", now), None);
		assert_eq!(parse_retry_after("soon", now), None);
	}
}
