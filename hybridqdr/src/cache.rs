//! The in-memory template database.

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::template::{Generator, Master};

/// A cell holding the generated master of one parameter set.
pub(crate) type MasterCell<G> = Arc<OnceCell<Result<Arc<Master<G>>>>>;

/// Generated masters, keyed by generator type and then by parameters.
///
/// Each generator type gets its own `HashMap<G, MasterCell<G>>`, stored as a
/// type-erased value and downcast on access.
#[derive(Default)]
pub(crate) struct TemplateDb {
    cells: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    generated: usize,
}

impl TemplateDb {
    /// Returns the cell for `params`, creating an empty one if needed.
    ///
    /// The second element is `true` if the cell already existed.
    pub(crate) fn entry<G: Generator>(&mut self, params: G) -> Result<(MasterCell<G>, bool)> {
        let map = self
            .cells
            .entry(TypeId::of::<G>())
            .or_insert_with(|| Box::new(HashMap::<G, MasterCell<G>>::new()))
            .downcast_mut::<HashMap<G, MasterCell<G>>>()
            .ok_or_else(|| Error::invariant("template database type mismatch"))?;

        Ok(match map.entry(params) {
            Entry::Occupied(o) => (o.get().clone(), true),
            Entry::Vacant(v) => {
                self.generated += 1;
                (v.insert(Arc::new(OnceCell::new())).clone(), false)
            }
        })
    }

    /// The number of distinct parameter sets requested so far.
    pub(crate) fn len(&self) -> usize {
        self.generated
    }
}
