/// Cross-source delay reconciliation.
///
/// A trip's own telemetry feed is the primary delay signal; a
/// corroborating source (station departure board, a second planner
/// feed) is secondary. The secondary figure is adopted only when it is
/// strictly greater than the primary AND positive: a second source may
/// report a train as *more* late, never less, and a non-positive figure
/// never overrides. Disagreement is resolved here deterministically and
/// is never surfaced as an error.
pub fn reconcile_delay(primary: Option<i32>, secondary: Option<i32>) -> Option<i32> {
    match (primary, secondary) {
        (Some(p), Some(s)) if s > p && s > 0 => Some(s),
        // No primary signal at all: a positive secondary is information.
        (None, Some(s)) if s > 0 => Some(s),
        _ => primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopts_secondary_only_when_greater_and_positive() {
        assert_eq!(reconcile_delay(Some(2), Some(7)), Some(7));
        assert_eq!(reconcile_delay(Some(5), Some(3)), Some(5));
        assert_eq!(reconcile_delay(Some(5), Some(5)), Some(5));
        assert_eq!(reconcile_delay(Some(-3), Some(0)), Some(-3));
        assert_eq!(reconcile_delay(Some(-3), Some(2)), Some(2));
    }

    #[test]
    fn never_invents_lateness_from_nothing() {
        assert_eq!(reconcile_delay(Some(0), None), Some(0));
        assert_eq!(reconcile_delay(None, None), None);
        assert_eq!(reconcile_delay(None, Some(0)), None);
        assert_eq!(reconcile_delay(None, Some(-4)), None);
    }

    #[test]
    fn unknown_primary_accepts_positive_board_figure() {
        assert_eq!(reconcile_delay(None, Some(6)), Some(6));
    }

    #[test]
    fn result_is_monotone_in_primary() {
        for p in -15..=15 {
            for s in -15..=15 {
                let out = reconcile_delay(Some(p), Some(s)).unwrap();
                if s > p && s > 0 {
                    assert_eq!(out, s);
                } else {
                    assert_eq!(out, p);
                }
                assert!(out >= p);
            }
        }
    }
}
