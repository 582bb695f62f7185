use crate::{Location, LocationId};
use std::collections::{HashMap, HashSet};

/// Kit organization: locations nested into vehicles, kits, pouches, rooms and shelves
#[derive(Clone, Debug)]
pub struct LocationTree {
    locations: HashMap<LocationId, Location>,
    children: HashMap<Option<LocationId>, Vec<LocationId>>,
}

impl LocationTree {
    /// Locations whose parent is unknown are treated as roots
    pub fn new(locations: Vec<Location>) -> LocationTree {
        let locations = locations
            .into_iter()
            .map(|l| (l.id, l))
            .collect::<HashMap<_, _>>();
        let mut children = HashMap::<Option<LocationId>, Vec<LocationId>>::new();
        for l in locations.values() {
            let parent = l.parent_id.filter(|p| locations.contains_key(p));
            children.entry(parent).or_default().push(l.id);
        }
        let name = |id: &LocationId| &locations[id].name;
        for c in children.values_mut() {
            c.sort_by(|a, b| name(a).cmp(name(b)).then(a.cmp(b)));
        }
        LocationTree {
            locations,
            children,
        }
    }

    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    pub fn roots(&self) -> &[LocationId] {
        self.children.get(&None).map(|v| &v[..]).unwrap_or(&[])
    }

    pub fn children(&self, id: LocationId) -> &[LocationId] {
        self.children.get(&Some(id)).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Names from the root down to `id`, or `None` if `id` is unknown
    pub fn path(&self, id: LocationId) -> Option<Vec<&str>> {
        let mut res = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(c) = current {
            let Some(l) = self.locations.get(&c) else {
                break;
            };
            if !seen.insert(c) {
                // Cycle in stored data, stop at the point of repetition
                break;
            }
            res.push(l.name.as_str());
            current = l.parent_id;
        }
        if res.is_empty() {
            return None;
        }
        res.reverse();
        Some(res)
    }

    /// Every location below `id`, depth-first
    pub fn descendants(&self, id: LocationId) -> Vec<LocationId> {
        let mut res = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack = self.children(id).iter().rev().copied().collect::<Vec<_>>();
        while let Some(c) = stack.pop() {
            if !seen.insert(c) {
                continue;
            }
            res.push(c);
            stack.extend(self.children(c).iter().rev().copied());
        }
        res
    }

    /// Checks that moving `id` under `new_parent` keeps the hierarchy a forest
    pub fn check_reparent(
        &self,
        id: LocationId,
        new_parent: Option<LocationId>,
    ) -> crate::Result<()> {
        let Some(parent) = new_parent else {
            return Ok(());
        };
        if !self.locations.contains_key(&parent) {
            return Err(crate::Error::InvalidHierarchy(format!(
                "parent location {parent} does not exist"
            )));
        }
        if parent == id || self.descendants(id).contains(&parent) {
            return Err(crate::Error::InvalidHierarchy(format!(
                "moving {id} under {parent} would create a cycle"
            )));
        }
        Ok(())
    }
}
