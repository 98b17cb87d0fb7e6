//! Internal logging shim.
//!
//! Forwards to `log` and/or `defmt` when the matching feature is enabled and
//! compiles to nothing otherwise, so the engine can be traced on development
//! hosts without paying for it on constrained targets.

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "log")]
        ::log::debug!($s $(, $x)*);
        #[cfg(feature = "defmt")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        {
            $(let _ = &$x;)*
        }
    }};
}
