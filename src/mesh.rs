//! Meshes with a refinement tree and a per-cell polynomial order field.
use crate::error::{DofError, MeshTopologyError};
use crate::CellId;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod procedural;
mod topology;

pub use topology::*;

/// Shared, monotonically increasing topology version.
///
/// Every h-refinement, h-unrefinement and change of polynomial order increments the counter.
/// Objects that derive data from a mesh keep a handle and compare versions to detect stale data.
#[derive(Debug, Clone, Default)]
pub struct TopologyVersion(Arc<AtomicU64>);

impl TopologyVersion {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn starting_at(value: u64) -> Self {
        Self(Arc::new(AtomicU64::new(value)))
    }
}

/// A change made to a mesh, passed on to the observers of the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefinementEvent {
    HRefined { cells: Vec<CellId>, children: Vec<CellId> },
    PRefined { cells: Vec<CellId>, delta_p: usize },
    HUnrefined { cells: Vec<CellId> },
}

/// Something that holds data derived from a mesh and must be told when the mesh changes.
///
/// Observers are not registered with the mesh. Instead the driver passes the list of observers
/// explicitly to [`Mesh::notify_observers`] after every change.
pub trait RefinementObserver {
    fn mesh_changed(&mut self, mesh: &Mesh, event: &RefinementEvent) -> Result<(), DofError>;
}

/// A mesh owns its topology exclusively. Polynomial orders live on the cells of the topology.
#[derive(Debug)]
pub struct Mesh {
    topology: MeshTopology,
    version: TopologyVersion,
}

/// Clones get their own version counter, starting from the current version.
impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self {
            topology: self.topology.clone(),
            version: TopologyVersion::starting_at(self.version()),
        }
    }
}

impl Mesh {
    pub fn new(topology: MeshTopology) -> Self {
        Self {
            topology,
            version: TopologyVersion::default(),
        }
    }

    pub fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    pub fn space_dim(&self) -> usize {
        self.topology.space_dim()
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn version_handle(&self) -> TopologyVersion {
        self.version.clone()
    }

    pub fn cell(&self, id: CellId) -> Result<&Cell, MeshTopologyError> {
        self.topology.cell(id)
    }

    /// Ids of the active cells in increasing order.
    pub fn active_cells(&self) -> Vec<CellId> {
        self.topology.active_cells()
    }

    pub fn h1_order(&self, id: CellId) -> Result<usize, MeshTopologyError> {
        Ok(self.topology.cell(id)?.h1_order())
    }

    fn check_active(&self, cells: &[CellId]) -> Result<(), MeshTopologyError> {
        for &cell in cells {
            self.topology.active_cell(cell)?;
        }
        Ok(())
    }

    /// Refines the given active cells. Either all cells are refined, or none are.
    pub fn h_refine(&mut self, cells: &[CellId]) -> Result<RefinementEvent, MeshTopologyError> {
        self.check_active(cells)?;
        let mut cells = cells.to_vec();
        cells.sort_unstable();
        cells.dedup();
        let mut children = Vec::new();
        for &cell in &cells {
            children.extend(self.topology.refine_cell(cell)?);
        }
        self.version.increment();
        debug!("h-refined {} cells into {} children", cells.len(), children.len());
        Ok(RefinementEvent::HRefined { cells, children })
    }

    /// Increases the polynomial order of the given active cells.
    pub fn p_refine(&mut self, cells: &[CellId], delta_p: usize) -> Result<RefinementEvent, MeshTopologyError> {
        self.check_active(cells)?;
        let mut cells = cells.to_vec();
        cells.sort_unstable();
        cells.dedup();
        for &cell in &cells {
            let order = self.h1_order(cell)?;
            self.topology.set_h1_order(cell, order + delta_p)?;
        }
        self.version.increment();
        Ok(RefinementEvent::PRefined { cells, delta_p })
    }

    /// Sets the polynomial order of a single active cell.
    pub fn set_h1_order(&mut self, cell: CellId, order: usize) -> Result<RefinementEvent, MeshTopologyError> {
        let current = self.h1_order(cell)?;
        self.topology.set_h1_order(cell, order)?;
        self.version.increment();
        Ok(RefinementEvent::PRefined {
            cells: vec![cell],
            delta_p: order.saturating_sub(current),
        })
    }

    /// Removes the children of the given refined cells, whose children must all be active.
    pub fn h_unrefine(&mut self, cells: &[CellId]) -> Result<RefinementEvent, MeshTopologyError> {
        let mut cells = cells.to_vec();
        cells.sort_unstable();
        cells.dedup();
        for &cell in &cells {
            let parent = self.topology.cell(cell)?;
            if parent.is_active() {
                return Err(MeshTopologyError::NotRefined(cell));
            }
            for &child in parent.children() {
                if !self.topology.cell(child)?.is_active() {
                    return Err(MeshTopologyError::RefinedChild { parent: cell, child });
                }
            }
        }
        for &cell in &cells {
            self.topology.unrefine_cell(cell)?;
        }
        self.version.increment();
        Ok(RefinementEvent::HUnrefined { cells })
    }

    /// Delivers a refinement event to every observer, stopping at the first failure.
    pub fn notify_observers(
        &self,
        event: &RefinementEvent,
        observers: &mut [&mut dyn RefinementObserver],
    ) -> Result<(), DofError> {
        for observer in observers.iter_mut() {
            observer.mesh_changed(self, event)?;
        }
        Ok(())
    }
}
