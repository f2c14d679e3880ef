//! Parser guards against runaway loops and stack overflow

use super::ParseError;
use crate::syntax::token::Span;

/// Maximum iterations for any parser loop
const MAX_LOOP_ITERATIONS: usize = 100_000;

/// Maximum nesting depth of statements and expressions.
///
/// Debug builds overflow the test thread stack well before a few hundred
/// levels, so the limit stays far below that.
pub const MAX_PARSE_DEPTH: usize = 48;

/// Guard against infinite loops in the parser.
///
/// ```ignore
/// let mut guard = LoopGuard::new("object_literal");
/// while !parser.check(&Token::RightBrace) {
///     guard.check()?;
///     // ...
/// }
/// ```
pub struct LoopGuard {
    name: &'static str,
    count: usize,
}

impl LoopGuard {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self { name, count: 0 }
    }

    #[inline]
    pub fn check(&mut self) -> Result<(), ParseError> {
        self.count += 1;
        if self.count > MAX_LOOP_ITERATIONS {
            return Err(ParseError::limit_exceeded(
                format!("Loop '{}' exceeded {} iterations", self.name, MAX_LOOP_ITERATIONS),
                Span::default(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_guard_trips() {
        let mut guard = LoopGuard::new("spin");
        for _ in 0..MAX_LOOP_ITERATIONS {
            guard.check().unwrap();
        }
        assert!(guard.check().is_err());
    }
}
