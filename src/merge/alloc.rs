use std::collections::HashSet;

/// Hands out dense numeric display ids, skipping any already in use
#[derive(Debug, Clone)]
pub struct IdAllocator {
	used: HashSet<u32>,
	next: u32,
}

impl IdAllocator {
	pub fn new<I: IntoIterator<Item = u32>>(ids: I) -> Self {
		let used: HashSet<u32> = ids.into_iter().filter(|id| *id > 0).collect();
		IdAllocator { used, next: 1 }
	}

	/// Reserve an id allocated elsewhere
	pub fn reserve(&mut self, id: u32) {
		if id > 0 {
			self.used.insert(id);
		}
	}

	pub fn is_used(&self, id: u32) -> bool {
		self.used.contains(&id)
	}

	pub fn next_id(&mut self) -> u32 {
		while self.used.contains(&self.next) {
			self.next += 1;
		}
		let id = self.next;
		self.used.insert(id);
		self.next += 1;
		id
	}
}


// vim: ts=4
