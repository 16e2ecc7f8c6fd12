//! Port of `priority_schedule.py`: the two-cursor donor/recipient matcher
//! (spec.md §4.5).

use std::collections::HashMap;

use crate::pool::PoolInfo;

use super::{AllocationOptions, ScheduleStrategy};

pub struct PriorityStrategy;

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    delta: f64,
    is_recipient: bool,
    weight: f64,
    current_mem_mb: f64,
}

impl ScheduleStrategy for PriorityStrategy {
    fn compute_allocations(
        &self,
        opts: &AllocationOptions,
        pools_info: &HashMap<String, PoolInfo>,
    ) -> HashMap<String, f64> {
        let mut candidates = candidate_moves(opts, pools_info);
        if candidates.is_empty() {
            return HashMap::new();
        }

        sort_candidates(&mut candidates);

        // Step C: abort conditions.
        let no_donors = candidates.last().map(|c| c.delta >= 0.0).unwrap_or(true);
        let no_recipients = candidates.first().map(|c| c.delta <= 0.0).unwrap_or(true);
        if no_donors || no_recipients {
            return HashMap::new();
        }

        match_candidates(candidates)
    }
}

/// Step A: at most one candidate move per pool.
fn candidate_moves(opts: &AllocationOptions, pools_info: &HashMap<String, PoolInfo>) -> Vec<Candidate> {
    let unit = opts.memory_unit_mb;
    let mut candidates = Vec::new();

    for info in pools_info.values() {
        let wait_secs = info.stat.wait_secs;
        let wait_mem_avg = info.stat.wait_mem_avg_mb as f64;
        let used_mem_avg = info.stat.used_mem_avg_mb as f64;

        let delta = if wait_secs >= opts.busy_threshold_secs && wait_mem_avg > 0.0 {
            let headroom = info.bounds.max_mem_mb - info.current_mem_mb;
            round_up_to_unit(wait_mem_avg.min(headroom), unit)
        } else if wait_secs == 0.0 {
            let free = (info.current_mem_mb - used_mem_avg.max(info.bounds.min_mem_mb)) * opts.free_ratio;
            let free_unit = round_down_to_unit(free, unit);
            if free_unit > 0.0 {
                -free_unit
            } else {
                continue;
            }
        } else {
            continue;
        };

        if delta == 0.0 {
            continue;
        }

        candidates.push(Candidate {
            name: info.name.clone(),
            delta,
            is_recipient: delta > 0.0,
            weight: info.weight,
            current_mem_mb: info.current_mem_mb,
        });
    }

    candidates
}

fn round_up_to_unit(value: f64, unit: f64) -> f64 {
    if value <= 0.0 || unit <= 0.0 {
        return 0.0;
    }
    (value / unit).ceil() * unit
}

fn round_down_to_unit(value: f64, unit: f64) -> f64 {
    if value <= 0.0 || unit <= 0.0 {
        return 0.0;
    }
    (value / unit).floor() * unit
}

/// Step B: descending by `(is_recipient, weight, delta)`. This single key
/// produces the priority order described in spec.md §4.5 for both sides:
/// recipients by descending weight/demand at the front, donors by
/// descending weight at the back (so the lowest-weight, smallest-supply
/// donor sits at the very end, examined first as `j` starts there).
fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.is_recipient
            .cmp(&a.is_recipient)
            .then_with(|| b.weight.total_cmp(&a.weight))
            .then_with(|| b.delta.total_cmp(&a.delta))
    });
}

/// Step D: two-cursor matching, mutating `delta` in place as transfers
/// consume candidates.
fn match_candidates(mut candidates: Vec<Candidate>) -> HashMap<String, f64> {
    let mut target: HashMap<String, f64> = HashMap::new();
    let current: HashMap<String, f64> =
        candidates.iter().map(|c| (c.name.clone(), c.current_mem_mb)).collect();

    let mut i = 0usize;
    let mut j = candidates.len() - 1;

    while i < j {
        if candidates[i].delta < 0.0 {
            i += 1;
            continue;
        }
        if candidates[j].delta > 0.0 {
            j -= 1;
            continue;
        }
        if i >= j {
            break;
        }

        let need = candidates[i].delta;
        let supply = -candidates[j].delta;
        let recipient = candidates[i].name.clone();
        let donor = candidates[j].name.clone();

        if need > supply {
            *target.entry(recipient).or_insert_with(|| current[&candidates[i].name]) += supply;
            *target.entry(donor).or_insert_with(|| current[&candidates[j].name]) -= supply;
            candidates[i].delta = need - supply;
            j -= 1;
        } else {
            *target.entry(recipient).or_insert_with(|| current[&candidates[i].name]) += need;
            *target.entry(donor).or_insert_with(|| current[&candidates[j].name]) -= need;
            candidates[j].delta = -(supply - need);
            i += 1;
        }
    }

    target.retain(|name, &mut mb| (mb - current[name]).abs() > f64::EPSILON);
    target
}
