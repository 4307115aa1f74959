//! Request-scoped logging handle
//!
//! The library never installs a logger. Every calculation receives a [Trace]
//! which routes records through the [log] facade under its own target, so
//! that concurrent calculations can be told apart and silenced independently.

use std::fmt;

use log::{Level, LevelFilter};

/// Logging handle for one calculation request
#[derive(Debug, Clone)]
pub struct Trace {
    target: String,
    level: LevelFilter,
}
impl Default for Trace {
    fn default() -> Self {
        Self::new("psf")
    }
}
impl Trace {
    /// Creates a handle logging under the target `psf_calc::<request>`
    pub fn new(request: impl fmt::Display) -> Self {
        Self {
            target: format!("psf_calc::{request}"),
            level: LevelFilter::Trace,
        }
    }
    /// A handle that drops every record
    pub fn silent() -> Self {
        Self {
            level: LevelFilter::Off,
            ..Default::default()
        }
    }
    /// Sets the most verbose level this request emits
    pub fn level(self, level: LevelFilter) -> Self {
        Self { level, ..self }
    }
    /// Derives a handle for a sub-task of this request, e.g. a datacube slice
    pub fn child(&self, name: impl fmt::Display) -> Self {
        Self {
            target: format!("{}::{name}", self.target),
            level: self.level,
        }
    }
    pub fn target(&self) -> &str {
        &self.target
    }
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level <= self.level {
            log::log!(target: self.target.as_str(), level, "{}", args);
        }
    }
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_target() {
        let trace = Trace::new("calc42").child("slice003");
        assert_eq!(trace.target(), "psf_calc::calc42::slice003");
    }

    #[test]
    fn silent_keeps_target() {
        let trace = Trace::silent();
        assert_eq!(trace.target(), "psf_calc::psf");
        trace.info(format_args!("dropped"));
    }
}
