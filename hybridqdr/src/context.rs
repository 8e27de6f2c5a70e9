//! The shared state of a layout generation run.

use std::sync::{Arc, Mutex};

use routing::{RoutingGrid, TrackManager, TrackTables};
use tracing::{debug, span, Level};

use crate::cache::TemplateDb;
use crate::error::{Error, Result};
use crate::tech::MosTech;
use crate::template::{Generator, Master, TemplateBuilder};

/// A handle to the routing grid, device technology and template database.
///
/// Cloning the context is cheap; all clones share the same template database.
#[derive(Clone)]
pub struct LayoutContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    grid: Arc<RoutingGrid>,
    tech: MosTech,
    db: Mutex<TemplateDb>,
}

impl std::fmt::Debug for LayoutContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutContext")
            .field("grid", &self.inner.grid)
            .field("tech", &self.inner.tech)
            .finish_non_exhaustive()
    }
}

impl LayoutContext {
    /// Creates a new context with an empty template database.
    pub fn new(grid: RoutingGrid, tech: MosTech) -> Result<Self> {
        tech.validate(&grid)?;
        Ok(Self {
            inner: Arc::new(ContextInner {
                grid: Arc::new(grid),
                tech,
                db: Mutex::new(TemplateDb::default()),
            }),
        })
    }

    /// The routing grid.
    #[inline]
    pub fn grid(&self) -> &RoutingGrid {
        &self.inner.grid
    }

    /// A shared handle to the routing grid.
    #[inline]
    pub fn grid_arc(&self) -> Arc<RoutingGrid> {
        self.inner.grid.clone()
    }

    /// The transistor row technology.
    #[inline]
    pub fn tech(&self) -> &MosTech {
        &self.inner.tech
    }

    /// A track manager over this context's grid.
    pub fn track_manager(&self, tables: TrackTables, half_space: bool) -> TrackManager {
        TrackManager::new(self.grid_arc(), tables, half_space)
    }

    /// The number of distinct templates requested from this context.
    pub fn num_templates(&self) -> Result<usize> {
        Ok(self.lock_db()?.len())
    }

    fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, TemplateDb>> {
        self.inner
            .db
            .lock()
            .map_err(|_| Error::invariant("template database lock poisoned"))
    }

    /// Returns the master generated from `params`, generating it on first use.
    ///
    /// Requests with equal parameters return the same [`Arc`]. Generators may
    /// request other masters while generating.
    pub fn new_template<G: Generator>(&self, params: G) -> Result<Arc<Master<G>>> {
        let (cell, hit) = self.lock_db()?.entry(params.clone())?;
        if hit {
            debug!(name = %params.name(), "template cache hit");
        }
        cell.get_or_init(|| self.generate(params)).clone()
    }

    /// Returns the master generated from a modified copy of `master`'s parameters.
    pub fn new_template_with<G: Generator>(
        &self,
        master: &Master<G>,
        update: impl FnOnce(&mut G),
    ) -> Result<Arc<Master<G>>> {
        let mut params = master.params().clone();
        update(&mut params);
        self.new_template(params)
    }

    fn generate<G: Generator>(&self, params: G) -> Result<Arc<Master<G>>> {
        let name = params.name();
        let span = span!(Level::INFO, "generate", name = %name);
        let _guard = span.enter();

        let mut builder = TemplateBuilder::new(self.clone(), name);
        let data = params.generate(&mut builder)?;
        let template = builder.finish()?;
        debug!(
            bbox = ?template.bound_box(),
            ports = template.port_names().count(),
            "generated template"
        );
        Ok(Arc::new(Master::new(params, Arc::new(template), data)))
    }
}
