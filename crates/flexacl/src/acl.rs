//! ACL objects: a direction and an ordered group of regions.

use std::collections::HashSet;

use flexacl_common::{Arena, Query, QueryResult};
use flexacl_hw::{AclId, AclKind, RegionId};

use crate::error::{AclError, Result};
use crate::region::RegionAllocator;
use crate::types::{AclType, Direction, DirectionSet};

/// An ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub id: AclId,
    pub acl_type: AclType,
    pub direction: Direction,
    /// Directions served by a multi-point ACL. Empty until set, then fixed.
    pub bitmap: DirectionSet,
    /// Regions searched in order.
    pub regions: Vec<RegionId>,
}

impl Acl {
    pub fn is_multi_point(&self) -> bool {
        self.direction == Direction::MultiPoints
    }

    /// Returns true if the ACL can be enforced in `direction`.
    pub fn serves(&self, direction: Direction) -> bool {
        if self.is_multi_point() {
            self.bitmap.includes(direction)
        } else {
            self.direction == direction
        }
    }

    pub fn uses_region(&self, region: RegionId) -> bool {
        self.regions.contains(&region)
    }
}

/// ACL storage.
#[derive(Debug, Clone)]
pub struct AclStore {
    acls: Arena<Acl, AclKind>,
}

impl AclStore {
    pub fn new(limit: usize) -> Self {
        Self {
            acls: Arena::with_limit(limit),
        }
    }

    fn check_regions(regions: &[RegionId], allocator: &RegionAllocator) -> Result<()> {
        if regions.is_empty() {
            return Err(AclError::invalid("an ACL needs at least one region"));
        }
        let mut seen = HashSet::new();
        for region in regions {
            if !allocator.contains(*region) {
                return Err(AclError::not_found(format!("{:?}", region)));
            }
            if !seen.insert(*region) {
                return Err(AclError::invalid(format!("{:?} listed twice", region)));
            }
        }
        Ok(())
    }

    /// Validates a new ACL and predicts its id.
    pub fn plan_create(
        &self,
        direction: Direction,
        bitmap: DirectionSet,
        regions: &[RegionId],
        allocator: &RegionAllocator,
    ) -> Result<AclId> {
        if direction != Direction::MultiPoints && !bitmap.is_empty() {
            return Err(AclError::invalid(format!(
                "direction bitmap only applies to {} ACLs",
                Direction::MultiPoints
            )));
        }
        Self::check_regions(regions, allocator)?;
        self.acls
            .next_handle()
            .ok_or_else(|| AclError::exhausted("ACL table is full"))
    }

    pub(crate) fn insert(
        &mut self,
        acl_type: AclType,
        direction: Direction,
        bitmap: DirectionSet,
        regions: Vec<RegionId>,
    ) -> Result<AclId> {
        self.acls
            .insert_with(|id| Acl {
                id,
                acl_type,
                direction,
                bitmap,
                regions,
            })
            .ok_or_else(|| AclError::exhausted("ACL table is full"))
    }

    /// Validates an edit and returns the bitmap the ACL will carry.
    ///
    /// A non-empty bitmap can be set once; later edits must pass it
    /// unchanged or empty.
    pub fn plan_edit(
        &self,
        id: AclId,
        regions: &[RegionId],
        bitmap: DirectionSet,
        allocator: &RegionAllocator,
    ) -> Result<DirectionSet> {
        let acl = self.get(id)?;
        Self::check_regions(regions, allocator)?;
        if bitmap.is_empty() {
            return Ok(acl.bitmap);
        }
        if !acl.is_multi_point() {
            return Err(AclError::invalid(format!(
                "{:?} is not a {} ACL",
                id,
                Direction::MultiPoints
            )));
        }
        if !acl.bitmap.is_empty() && acl.bitmap != bitmap {
            return Err(AclError::invalid(format!(
                "direction bitmap of {:?} is already {:?}",
                id, acl.bitmap
            )));
        }
        Ok(bitmap)
    }

    pub(crate) fn commit_edit(
        &mut self,
        id: AclId,
        regions: Vec<RegionId>,
        bitmap: DirectionSet,
    ) -> Result<()> {
        let acl = self
            .acls
            .get_mut(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))?;
        acl.regions = regions;
        acl.bitmap = bitmap;
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: AclId) -> Result<Acl> {
        self.acls
            .remove(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub fn get(&self, id: AclId) -> Result<&Acl> {
        self.acls
            .get(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub fn contains(&self, id: AclId) -> bool {
        self.acls.contains(id)
    }

    /// First ACL that lists `region`.
    pub fn user_of(&self, region: RegionId) -> Option<AclId> {
        self.acls
            .iter()
            .find(|(_, acl)| acl.uses_region(region))
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.acls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AclId, &Acl)> {
        self.acls.iter()
    }

    pub fn query(&self, query: Query<AclId>) -> Result<QueryResult<AclId>> {
        query
            .select(self.acls.handles())
            .ok_or_else(|| AclError::not_found("ACL"))
    }
}
