//! Pareto utilities for multi-objective search.
//!
//! NSGA-II style fast non-dominated sorting and crowding distance. All
//! objectives are maximized; callers negate anything they want minimized.

use std::cmp::Ordering;

/// `a` dominates `b` iff it is no worse in every objective and strictly
/// better in at least one. Vectors of different length never dominate.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut strictly_better = false;
    for (&x, &y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Partition point indices into successive non-dominated fronts (front 0 best).
pub fn fast_non_dominated_sort(points: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut first = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&points[i], &points[j]) {
                dominated[i].push(j);
            } else if dominates(&points[j], &points[i]) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            first.push(i);
        }
    }

    let mut fronts = Vec::new();
    let mut current = first;
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Crowding distance of each member of `front`, parallel to `front`.
///
/// Per objective the front is sorted; the extremes get infinite distance and
/// interior points accumulate the normalized gap between their neighbours.
pub fn crowding_distance(points: &[Vec<f64>], front: &[usize]) -> Vec<f64> {
    let size = front.len();
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }
    let mut distance = vec![0.0; size];
    let objectives = points[front[0]].len();

    for obj in 0..objectives {
        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by(|&a, &b| {
            points[front[a]][obj]
                .partial_cmp(&points[front[b]][obj])
                .unwrap_or(Ordering::Equal)
        });

        distance[order[0]] = f64::INFINITY;
        distance[order[size - 1]] = f64::INFINITY;

        let min = points[front[order[0]]][obj];
        let max = points[front[order[size - 1]]][obj];
        let range = max - min;
        if range.abs() < 1e-12 {
            continue;
        }
        for k in 1..size - 1 {
            let prev = points[front[order[k - 1]]][obj];
            let next = points[front[order[k + 1]]][obj];
            distance[order[k]] += (next - prev) / range;
        }
    }
    distance
}

/// Pick `count` indices: whole fronts in rank order, the last partially
/// admitted front truncated by descending crowding distance.
pub fn select(points: &[Vec<f64>], count: usize) -> Vec<usize> {
    let mut selected = Vec::with_capacity(count);
    for front in fast_non_dominated_sort(points) {
        if selected.len() + front.len() <= count {
            selected.extend_from_slice(&front);
            continue;
        }
        let distance = crowding_distance(points, &front);
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| distance[b].partial_cmp(&distance[a]).unwrap_or(Ordering::Equal));
        let need = count - selected.len();
        selected.extend(order.into_iter().take(need).map(|k| front[k]));
        break;
    }
    selected
}
