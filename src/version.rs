//! Per-device version vectors
//!
//! Each replicated entity carries a map from device id to a counter that only
//! the owning device increments. Comparing two vectors tells whether one
//! revision causally precedes the other or whether they were made
//! independently.

use std::collections::BTreeMap;

/// Device id -> edit counter
pub type VersionVector = BTreeMap<String, u64>;

/// Causal relationship of `a` relative to `b`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
	Equal,
	/// `a` is older than `b`
	Less,
	/// `a` is newer than `b`
	Greater,
	/// Neither dominates: independent edits
	Concurrent,
}

impl VersionOrder {
	/// The same relationship seen from the other side
	pub fn reverse(self) -> Self {
		match self {
			VersionOrder::Less => VersionOrder::Greater,
			VersionOrder::Greater => VersionOrder::Less,
			other => other,
		}
	}
}

/// Compare two version vectors.
///
/// When both are empty the wall-clock timestamps decide; otherwise the
/// comparison runs component-wise over the union of keys, absent keys
/// counting as zero.
pub fn compare_version(
	a: &VersionVector,
	b: &VersionVector,
	a_updated: i64,
	b_updated: i64,
) -> VersionOrder {
	if a.is_empty() && b.is_empty() {
		return match a_updated.cmp(&b_updated) {
			std::cmp::Ordering::Equal => VersionOrder::Equal,
			std::cmp::Ordering::Less => VersionOrder::Less,
			std::cmp::Ordering::Greater => VersionOrder::Greater,
		};
	}

	let mut less = false;
	let mut greater = false;
	for key in a.keys().chain(b.keys()) {
		let av = a.get(key).copied().unwrap_or(0);
		let bv = b.get(key).copied().unwrap_or(0);
		if av < bv {
			less = true;
		} else if av > bv {
			greater = true;
		}
	}

	match (less, greater) {
		(true, true) => VersionOrder::Concurrent,
		(true, false) => VersionOrder::Less,
		(false, true) => VersionOrder::Greater,
		(false, false) => VersionOrder::Equal,
	}
}

/// Copy of `v` with the counter for `device_id` incremented
pub fn bump_version(v: &VersionVector, device_id: &str) -> VersionVector {
	let mut out = v.clone();
	*out.entry(device_id.to_string()).or_insert(0) += 1;
	out
}

/// Component-wise maximum of two vectors
pub fn join_versions(a: &VersionVector, b: &VersionVector) -> VersionVector {
	let mut out = a.clone();
	for (key, &bv) in b {
		let entry = out.entry(key.clone()).or_insert(0);
		if bv > *entry {
			*entry = bv;
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vv(entries: &[(&str, u64)]) -> VersionVector {
		entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
	}

	#[test]
	fn test_empty_vectors_fall_back_to_timestamps() {
		let empty = VersionVector::new();
		assert_eq!(compare_version(&empty, &empty, 5, 5), VersionOrder::Equal);
		assert_eq!(compare_version(&empty, &empty, 4, 5), VersionOrder::Less);
		assert_eq!(compare_version(&empty, &empty, 6, 5), VersionOrder::Greater);
	}

	#[test]
	fn test_dominance() {
		let a = vv(&[("A", 1)]);
		let b = vv(&[("A", 2)]);
		assert_eq!(compare_version(&a, &b, 0, 0), VersionOrder::Less);
		assert_eq!(compare_version(&b, &a, 0, 0), VersionOrder::Greater);

		// Absent key counts as zero
		let c = vv(&[("A", 1), ("B", 1)]);
		assert_eq!(compare_version(&a, &c, 0, 0), VersionOrder::Less);
	}

	#[test]
	fn test_empty_against_non_empty() {
		let empty = VersionVector::new();
		let a = vv(&[("A", 1)]);
		assert_eq!(compare_version(&empty, &a, 100, 0), VersionOrder::Less);
	}

	#[test]
	fn test_concurrent() {
		let a = vv(&[("A", 2)]);
		let b = vv(&[("B", 1)]);
		assert_eq!(compare_version(&a, &b, 0, 0), VersionOrder::Concurrent);
		assert_eq!(compare_version(&b, &a, 0, 0), VersionOrder::Concurrent);
	}

	#[test]
	fn test_compare_is_antisymmetric() {
		let samples = [
			vv(&[]),
			vv(&[("A", 1)]),
			vv(&[("A", 2)]),
			vv(&[("B", 1)]),
			vv(&[("A", 1), ("B", 1)]),
			vv(&[("A", 2), ("B", 0)]),
			vv(&[("A", 3), ("C", 7)]),
		];
		for (i, a) in samples.iter().enumerate() {
			for (j, b) in samples.iter().enumerate() {
				let (ta, tb) = (i as i64, j as i64);
				assert_eq!(
					compare_version(a, b, ta, tb),
					compare_version(b, a, tb, ta).reverse(),
					"a={:?} b={:?}",
					a,
					b
				);
			}
		}
	}

	#[test]
	fn test_bump_does_not_mutate_input() {
		let a = vv(&[("A", 1)]);
		let bumped = bump_version(&a, "A");
		assert_eq!(a["A"], 1);
		assert_eq!(bumped["A"], 2);
		assert_eq!(bump_version(&a, "B")["B"], 1);
	}

	#[test]
	fn test_join_dominates_both() {
		let a = vv(&[("A", 2)]);
		let b = vv(&[("A", 1), ("B", 3)]);
		let j = join_versions(&a, &b);
		assert_eq!(j, vv(&[("A", 2), ("B", 3)]));
		assert_ne!(compare_version(&j, &a, 0, 0), VersionOrder::Less);
		assert_ne!(compare_version(&j, &b, 0, 0), VersionOrder::Less);
	}
}

// vim: ts=4
