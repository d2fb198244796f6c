use crate::errors::AlarmError;
use std::sync::atomic::{AtomicU64, Ordering};

/// [`NthExpr`] is the user-facing form of an nth-occurrence filter, either an exact 1-based
/// occurrence index or an ``an+b`` expression. It converts from integers and strings so repeat
/// presets can be configured with ``Repeat::weekly(2)`` or ``Repeat::weekly("2n+1")``
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NthExpr {
    Index(u64),
    Expression(String),
}

impl From<u64> for NthExpr {
    fn from(index: u64) -> Self {
        NthExpr::Index(index)
    }
}

impl From<u32> for NthExpr {
    fn from(index: u32) -> Self {
        NthExpr::Index(index as u64)
    }
}

impl From<&str> for NthExpr {
    fn from(expression: &str) -> Self {
        NthExpr::Expression(expression.to_string())
    }
}

impl From<String> for NthExpr {
    fn from(expression: String) -> Self {
        NthExpr::Expression(expression)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector {
    Every,
    Exact(u64),
    Progression { coefficient: i64, offset: i64 },
}

impl Selector {
    fn matches(&self, index: u64) -> bool {
        match *self {
            Selector::Every => true,
            Selector::Exact(expected) => index == expected,
            Selector::Progression {
                coefficient: 0,
                offset,
            } => i128::from(index) == i128::from(offset),
            Selector::Progression {
                coefficient,
                offset,
            } => {
                // Widened so no counter and offset pair can overflow
                let distance = i128::from(index) - i128::from(offset);
                let coefficient = i128::from(coefficient);
                distance % coefficient == 0 && distance / coefficient >= 0
            }
        }
    }
}

/// [`NthFilter`] selects every k-th occurrence of a repeat rule. It keeps a 1-based counter
/// that advances on **every** evaluation, whether or not the occurrence is accepted, so one
/// filter instance belongs to one configured repeat rule for its whole life.
///
/// Expressions follow the ``an+b`` arithmetic progression form: counter ``c`` is accepted when
/// ``c = a*n + b`` for some integer ``n >= 0``. Besides the canonical ``2n+1`` the parser
/// accepts ``2n-1``, ``n``, ``-n+3``, ``3n``, a bare integer and the keywords ``odd`` and
/// ``even``, whitespace is ignored
///
/// # Example
/// ```ignore
/// let filter = NthFilter::parse(Some("2n+1".into()))?;
/// let accepted: Vec<bool> = (0..4).map(|_| filter.accepts()).collect();
/// assert_eq!(accepted, [true, false, true, false]);
/// ```
#[derive(Debug)]
pub struct NthFilter {
    selector: Selector,
    counter: AtomicU64,
}

impl NthFilter {
    /// A filter accepting every occurrence
    pub fn every() -> Self {
        Self::with(Selector::Every)
    }

    fn with(selector: Selector) -> Self {
        Self {
            selector,
            counter: AtomicU64::new(1),
        }
    }

    /// A filter with the same selection whose counter starts from one again
    pub fn fresh(&self) -> Self {
        Self::with(self.selector)
    }

    pub fn parse(expression: Option<NthExpr>) -> Result<Self, AlarmError> {
        let selector = match expression {
            None => Selector::Every,
            Some(NthExpr::Index(index)) => Selector::Exact(index),
            Some(NthExpr::Expression(expression)) => parse_expression(&expression)?,
        };
        Ok(Self::with(selector))
    }

    /// Evaluates the current occurrence and advances the counter
    pub fn accepts(&self) -> bool {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        self.selector.matches(index)
    }

    /// Whether this filter can ever reject, unfiltered rules skip the nth retry loop
    pub fn is_every(&self) -> bool {
        self.selector == Selector::Every
    }
}

fn parse_integer(text: &str, original: &str) -> Result<i64, AlarmError> {
    text.parse()
        .map_err(|_| AlarmError::InvalidExpression(original.to_string()))
}

fn parse_expression(original: &str) -> Result<Selector, AlarmError> {
    let compact: String = original
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    match compact.as_str() {
        "odd" => {
            return Ok(Selector::Progression {
                coefficient: 2,
                offset: 1,
            });
        }
        "even" => {
            return Ok(Selector::Progression {
                coefficient: 2,
                offset: 0,
            });
        }
        "" => return Err(AlarmError::InvalidExpression(original.to_string())),
        _ => {}
    }

    let Some((coefficient, offset)) = compact.split_once('n') else {
        // Exact indices are unsigned, a signed one could never match
        if !compact.chars().all(|c| c.is_ascii_digit()) {
            return Err(AlarmError::InvalidExpression(original.to_string()));
        }
        return compact
            .parse()
            .map(Selector::Exact)
            .map_err(|_| AlarmError::InvalidExpression(original.to_string()));
    };

    let coefficient = match coefficient {
        "" | "+" => 1,
        "-" => -1,
        digits => parse_integer(digits, original)?,
    };

    let offset = match offset {
        "" => 0,
        signed if signed.starts_with('+') || signed.starts_with('-') => {
            let unsigned = &signed[1..];
            if unsigned.is_empty() || !unsigned.chars().all(|c| c.is_ascii_digit()) {
                return Err(AlarmError::InvalidExpression(original.to_string()));
            }
            parse_integer(signed, original)?
        }
        _ => return Err(AlarmError::InvalidExpression(original.to_string())),
    };

    Ok(Selector::Progression {
        coefficient,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filter: &NthFilter, count: usize) -> Vec<u64> {
        (1..=count as u64).filter(|_| filter.accepts()).collect()
    }

    fn parsed(expression: &str) -> NthFilter {
        NthFilter::parse(Some(expression.into())).unwrap()
    }

    #[test]
    fn omitted_accepts_everything() {
        let filter = NthFilter::parse(None).unwrap();
        assert_eq!(run(&filter, 5), vec![1, 2, 3, 4, 5]);
        assert!(filter.is_every());
    }

    #[test]
    fn odd_progression() {
        assert_eq!(run(&parsed("2n+1"), 8), vec![1, 3, 5, 7]);
        assert_eq!(run(&parsed("odd"), 8), vec![1, 3, 5, 7]);
    }

    #[test]
    fn even_and_offset_progressions() {
        assert_eq!(run(&parsed("2n"), 8), vec![2, 4, 6, 8]);
        assert_eq!(run(&parsed(" 3n + 2 "), 9), vec![2, 5, 8]);
        assert_eq!(run(&parsed("2n-1"), 6), vec![1, 3, 5]);
        assert_eq!(run(&parsed("n+4"), 6), vec![4, 5, 6]);
    }

    #[test]
    fn negative_coefficient_takes_first_few() {
        assert_eq!(run(&parsed("-n+3"), 6), vec![1, 2, 3]);
    }

    #[test]
    fn exact_index() {
        assert_eq!(run(&NthFilter::parse(Some(3u64.into())).unwrap(), 6), vec![3]);
        assert_eq!(run(&parsed("4"), 6), vec![4]);
    }

    #[test]
    fn counter_advances_even_on_rejection() {
        let filter = parsed("3n");
        assert!(!filter.accepts());
        assert!(!filter.accepts());
        assert!(filter.accepts());
        assert!(!filter.accepts());
    }

    #[test]
    fn rejects_garbage() {
        for expression in ["", "2x+1", "n+", "2n*3", "nn", "2n+1+1", "abc"] {
            assert_eq!(
                NthFilter::parse(Some(expression.into())).unwrap_err(),
                AlarmError::InvalidExpression(expression.to_string()),
                "{expression}"
            );
        }
    }

    #[test]
    fn fresh_filter_counts_on_its_own() {
        let filter = parsed("2n+1");
        assert!(filter.accepts());
        let fresh = filter.fresh();
        assert!(!filter.accepts());
        assert!(fresh.accepts());
    }

    #[test]
    fn rejects_signed_exact_index() {
        for expression in ["-3", "+3", "-0"] {
            assert_eq!(
                NthFilter::parse(Some(expression.into())).unwrap_err(),
                AlarmError::InvalidExpression(expression.to_string()),
            );
        }
    }

    #[test]
    fn rejects_out_of_range_terms() {
        for expression in ["n+9223372036854775808", "99999999999999999999n", "18446744073709551616"] {
            assert_eq!(
                NthFilter::parse(Some(expression.into())).unwrap_err(),
                AlarmError::InvalidExpression(expression.to_string()),
            );
        }
    }

    #[test]
    fn extreme_terms_never_overflow() {
        let lowest_offset = parsed("n-9223372036854775808");
        assert_eq!(run(&lowest_offset, 3), vec![1, 2, 3]);

        let lowest_coefficient = parsed("-9223372036854775808n+2");
        assert_eq!(run(&lowest_coefficient, 3), vec![2]);

        let huge_index = NthFilter::parse(Some(u64::MAX.into())).unwrap();
        assert_eq!(run(&huge_index, 3), Vec::<u64>::new());
    }
}
