//! Signal aggregation across independently-configured selectors.
//!
//! Merges each selector's daily picks into a single candidate list under a
//! combination policy. TIME_WINDOW mode keeps a bounded rolling history of
//! (stock, selector, date) sightings, evicted by the simulation clock.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// How per-selector picks combine into one candidate set.
#[derive(Debug, Clone, PartialEq)]
pub enum CombinationMode {
    /// Union of all selectors' picks.
    Or,
    /// A stock qualifies only if every required selector names it on the
    /// same date. Empty set means all active selectors are required.
    And { required: Vec<String> },
    /// A stock qualifies once all required selectors have named it within
    /// a trailing window of `window` days, counting the current date.
    TimeWindow { window: i64, required: Vec<String> },
}

/// One qualifying candidate for the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub code: String,
    /// Alias of the originating selector; for AND mode, the required
    /// aliases joined with '+'; for TIME_WINDOW, the confirming selector.
    pub selector: String,
}

pub struct SignalAggregator {
    mode: CombinationMode,
    /// Latest sighting date per (code, selector alias). TIME_WINDOW only.
    sightings: HashMap<(String, String), NaiveDate>,
}

impl SignalAggregator {
    pub fn new(mode: CombinationMode) -> Self {
        Self {
            mode,
            sightings: HashMap::new(),
        }
    }

    pub fn mode(&self) -> &CombinationMode {
        &self.mode
    }

    /// Combine the day's raw per-selector picks into a de-duplicated,
    /// deterministically ordered candidate list.
    ///
    /// `raw` holds (selector alias, picks) for every active selector, in
    /// the configured selector order.
    pub fn combine(&mut self, date: NaiveDate, raw: &[(String, Vec<String>)]) -> Vec<Candidate> {
        let candidates = match &self.mode {
            CombinationMode::Or => Self::combine_or(raw),
            CombinationMode::And { required } => {
                let required = resolve_required(required, raw);
                Self::combine_and(raw, &required)
            }
            CombinationMode::TimeWindow { window, required } => {
                let window = *window;
                let required = resolve_required(required, raw);
                self.combine_time_window(date, raw, window, &required)
            }
        };

        // BTreeMap keyed by code both de-duplicates and fixes the order,
        // so sizing downstream is reproducible.
        let dedup: BTreeMap<String, Candidate> = candidates
            .into_iter()
            .map(|c| (c.code.clone(), c))
            .collect();
        dedup.into_values().collect()
    }

    fn combine_or(raw: &[(String, Vec<String>)]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (alias, picks) in raw {
            for code in picks {
                out.push(Candidate {
                    code: code.clone(),
                    selector: alias.clone(),
                });
            }
        }
        out
    }

    fn combine_and(raw: &[(String, Vec<String>)], required: &[String]) -> Vec<Candidate> {
        if required.is_empty() {
            return Vec::new();
        }
        let by_alias: HashMap<&str, &Vec<String>> =
            raw.iter().map(|(a, p)| (a.as_str(), p)).collect();

        let Some(first) = by_alias.get(required[0].as_str()) else {
            return Vec::new();
        };

        let tag = required.join("+");
        first
            .iter()
            .filter(|code| {
                required[1..].iter().all(|alias| {
                    by_alias
                        .get(alias.as_str())
                        .is_some_and(|picks| picks.contains(code))
                })
            })
            .map(|code| Candidate {
                code: code.clone(),
                selector: tag.clone(),
            })
            .collect()
    }

    fn combine_time_window(
        &mut self,
        date: NaiveDate,
        raw: &[(String, Vec<String>)],
        window: i64,
        required: &[String],
    ) -> Vec<Candidate> {
        let cutoff = date - Duration::days(window - 1);

        // Evict first so the buffer stays bounded by the window even for
        // stocks that never qualify.
        self.sightings.retain(|_, seen| *seen >= cutoff);

        for (alias, picks) in raw {
            for code in picks {
                self.sightings
                    .insert((code.clone(), alias.clone()), date);
            }
        }

        if required.is_empty() {
            return Vec::new();
        }

        // Only a signal arriving today can confirm; its selector becomes
        // the candidate's tag.
        let mut out = Vec::new();
        for (alias, picks) in raw {
            if !required.contains(alias) {
                continue;
            }
            for code in picks {
                let complete = required.iter().all(|req| {
                    self.sightings
                        .get(&(code.clone(), req.clone()))
                        .is_some_and(|seen| *seen >= cutoff)
                });
                if complete {
                    out.push(Candidate {
                        code: code.clone(),
                        selector: alias.clone(),
                    });
                }
            }
        }
        out
    }

    /// Size of the rolling sighting buffer. TIME_WINDOW keeps this bounded
    /// by eviction; other modes never populate it.
    pub fn history_len(&self) -> usize {
        self.sightings.len()
    }
}

fn resolve_required(required: &[String], raw: &[(String, Vec<String>)]) -> Vec<String> {
    if required.is_empty() {
        raw.iter().map(|(alias, _)| alias.clone()).collect()
    } else {
        required.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn raw(pairs: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        pairs
            .iter()
            .map(|(alias, picks)| {
                (
                    alias.to_string(),
                    picks.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn or_mode_unions_and_dedups() {
        let mut agg = SignalAggregator::new(CombinationMode::Or);
        let out = agg.combine(
            date(1),
            &raw(&[("a", &["000002", "000001"]), ("b", &["000001", "000003"])]),
        );
        let codes: Vec<&str> = out.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["000001", "000002", "000003"]);
    }

    #[test]
    fn or_mode_keeps_selector_tag() {
        let mut agg = SignalAggregator::new(CombinationMode::Or);
        let out = agg.combine(date(1), &raw(&[("a", &["000002"]), ("b", &["000003"])]));
        assert_eq!(out[0].selector, "a");
        assert_eq!(out[1].selector, "b");
    }

    #[test]
    fn and_mode_intersects_required() {
        let mut agg = SignalAggregator::new(CombinationMode::And { required: vec![] });
        let out = agg.combine(
            date(1),
            &raw(&[("a", &["000001", "000002"]), ("b", &["000002", "000003"])]),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "000002");
        assert_eq!(out[0].selector, "a+b");
    }

    #[test]
    fn and_mode_with_explicit_subset() {
        let mode = CombinationMode::And {
            required: vec!["a".into()],
        };
        let mut agg = SignalAggregator::new(mode);
        let out = agg.combine(
            date(1),
            &raw(&[("a", &["000001"]), ("b", &["000002"])]),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "000001");
    }

    #[test]
    fn and_output_is_subset_of_or_output() {
        let day = raw(&[
            ("a", &["000001", "000002", "000004"]),
            ("b", &["000002", "000003"]),
        ]);
        let or_out = SignalAggregator::new(CombinationMode::Or).combine(date(1), &day);
        let and_out = SignalAggregator::new(CombinationMode::And { required: vec![] })
            .combine(date(1), &day);

        for c in &and_out {
            assert!(or_out.iter().any(|o| o.code == c.code));
        }
    }

    #[test]
    fn time_window_confirms_on_most_recent_signal() {
        let mode = CombinationMode::TimeWindow {
            window: 5,
            required: vec!["a".into(), "b".into()],
        };
        let mut agg = SignalAggregator::new(mode);

        // Day 1: only selector a names the stock.
        let out = agg.combine(date(1), &raw(&[("a", &["000001"]), ("b", &[])]));
        assert!(out.is_empty());

        // Day 3: selector b confirms within the window.
        let out = agg.combine(date(3), &raw(&[("a", &[]), ("b", &["000001"])]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, "000001");
        assert_eq!(out[0].selector, "b");
    }

    #[test]
    fn time_window_expires_stale_sightings() {
        let mode = CombinationMode::TimeWindow {
            window: 5,
            required: vec!["a".into(), "b".into()],
        };
        let mut agg = SignalAggregator::new(mode);

        agg.combine(date(1), &raw(&[("a", &["000001"]), ("b", &[])]));
        // Day 7 is outside the 5-day window ending that day (cutoff day 3).
        let out = agg.combine(date(7), &raw(&[("a", &[]), ("b", &["000001"])]));
        assert!(out.is_empty());
    }

    #[test]
    fn time_window_evicts_history() {
        let mode = CombinationMode::TimeWindow {
            window: 3,
            required: vec!["a".into(), "b".into()],
        };
        let mut agg = SignalAggregator::new(mode);

        agg.combine(date(1), &raw(&[("a", &["000001"]), ("b", &[])]));
        assert_eq!(agg.history_len(), 1);
        agg.combine(date(10), &raw(&[("a", &[]), ("b", &[])]));
        assert_eq!(agg.history_len(), 0);
    }

    #[test]
    fn time_window_same_day_counts() {
        let mode = CombinationMode::TimeWindow {
            window: 5,
            required: vec![],
        };
        let mut agg = SignalAggregator::new(mode);
        let out = agg.combine(date(1), &raw(&[("a", &["000001"]), ("b", &["000001"])]));
        assert_eq!(out.len(), 1);
    }
}
