//! Accumulates the non-fatal [`Warning`](crate::errors::Warning)s a compile
//! produces alongside its fatal outcome, so `ilnc-driver` can print a
//! one-line summary the way a build tool reports "built with N warnings".

use crate::errors::Warning;

#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn warn(&mut self, warning: Warning) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%warning, "non-fatal compile warning");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn summary(&self) -> String {
        if self.warnings.is_empty() {
            "compiled with no warnings".to_string()
        } else {
            format!("compiled with {} warning(s)", self.warnings.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SymbolRef;

    #[test]
    fn accumulates_and_summarizes_warnings() {
        let mut diagnostics = Diagnostics::new();
        assert_eq!(diagnostics.summary(), "compiled with no warnings");
        diagnostics.warn(Warning { symbol: SymbolRef::assembly("App"), message: "unsupported P/Invoke".into() });
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.summary(), "compiled with 1 warning(s)");
    }
}
