// Event macros that forward to `tracing` when the feature is enabled and expand to nothing
// otherwise.

macro_rules! obs_warn {
	($($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		tracing::warn!($($arg)+);
	}};
}

macro_rules! obs_debug {
	($($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		tracing::debug!($($arg)+);
	}};
}
