//! Minimum-rule constraint resolution.
//!
//! For every entity shared between cells, exactly one cell's basis is authoritative. Candidates
//! are compared by [`MinimumRuleKey`]: the coarsest refinement level wins, then the lowest
//! polynomial order, then the lowest cell id.
//!
//! Sides (edges in 2D) are constrained by the coarsest entity in their refinement ancestry that is
//! a side of an active cell. A vertex is hanging if it was created as the midpoint of an edge
//! whose ancestry contains an active side; it is then constrained by the coarsest such edge.
//! Vertices that are not hanging are owned by the minimum-rule winner among the active cells
//! touching them. Cell interiors are always owned by the cell itself.
use crate::element::CellTopology;
use crate::error::MeshTopologyError;
use crate::mesh::{EdgeIndex, Mesh, VertexIndex};
use crate::CellId;
use rustc_hash::FxHashMap;
use std::fmt;

/// Total order used for every minimum-rule tie-break. Smaller keys win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinimumRuleKey {
    pub level: usize,
    pub h1_order: usize,
    pub cell: CellId,
}

impl MinimumRuleKey {
    pub fn for_cell(mesh: &Mesh, cell: CellId) -> Result<Self, MeshTopologyError> {
        let c = mesh.cell(cell)?;
        Ok(Self {
            level: c.level(),
            h1_order: c.h1_order(),
            cell,
        })
    }
}

/// Which subcell of which cell constrains a subcell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstrainingSubcellInfo {
    pub cell_id: CellId,
    /// Side of the constraining cell containing the constraining subcell. `None` for interiors.
    pub side_ordinal: Option<usize>,
    /// Ordinal of the constraining subcell within that side.
    pub subcell_ordinal_in_side: usize,
    pub dimension: usize,
}

/// Which cell owns the global DOFs of the entity that constrains a subcell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnershipInfo {
    pub cell_id: CellId,
    /// Index of the owning entity in the topology table of its dimension.
    pub owning_subcell_entity_index: usize,
    pub dimension: usize,
}

/// Constraint and ownership information for every subcell of a cell, indexed by subcell
/// dimension and then by subcell ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellConstraints {
    pub subcell_constraints: Vec<Vec<ConstrainingSubcellInfo>>,
    pub owner_for_subcell: Vec<Vec<OwnershipInfo>>,
}

impl CellConstraints {
    pub fn constraint(&self, dimension: usize, ordinal: usize) -> &ConstrainingSubcellInfo {
        &self.subcell_constraints[dimension][ordinal]
    }

    pub fn owner(&self, dimension: usize, ordinal: usize) -> &OwnershipInfo {
        &self.owner_for_subcell[dimension][ordinal]
    }
}

impl fmt::Display for CellConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (dimension, (constraints, owners)) in self
            .subcell_constraints
            .iter()
            .zip(&self.owner_for_subcell)
            .enumerate()
        {
            for (ordinal, (constraint, owner)) in constraints.iter().zip(owners).enumerate() {
                write!(f, "  dim {} subcell {}: constrained by cell {}", dimension, ordinal, constraint.cell_id)?;
                match constraint.side_ordinal {
                    Some(side) => write!(
                        f,
                        " side {} subcell {} (dim {})",
                        side, constraint.subcell_ordinal_in_side, constraint.dimension
                    )?,
                    None => write!(f, " interior (dim {})", constraint.dimension)?,
                }
                writeln!(
                    f,
                    "; owned by cell {} (entity {} of dim {})",
                    owner.cell_id, owner.owning_subcell_entity_index, owner.dimension
                )?;
            }
        }
        Ok(())
    }
}

/// The minimum-rule constraint of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeConstraint {
    /// The constraining edge: the edge itself or one of its ancestors.
    pub edge: EdgeIndex,
    /// The active cell whose side basis on `edge` is authoritative.
    pub cell: CellId,
    /// Side ordinal of `edge` in `cell`.
    pub side: usize,
}

/// The minimum-rule constraint of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexConstraint {
    /// The vertex carries its own global DOF, owned by `owner`.
    Free { owner: CellId },
    /// The vertex lies in the interior of an active side of a coarser cell.
    Hanging { edge: EdgeIndex },
}

/// Resolves and memoizes entity constraints for one state of a mesh.
#[derive(Debug)]
pub struct ConstraintResolver<'a> {
    mesh: &'a Mesh,
    edges: FxHashMap<EdgeIndex, EdgeConstraint>,
    vertices: FxHashMap<VertexIndex, VertexConstraint>,
}

impl<'a> ConstraintResolver<'a> {
    pub fn new(mesh: &'a Mesh) -> Self {
        Self {
            mesh,
            edges: FxHashMap::default(),
            vertices: FxHashMap::default(),
        }
    }

    pub fn mesh(&self) -> &'a Mesh {
        self.mesh
    }

    /// The minimum-rule winner among the given active cells.
    fn minimum_rule_winner<T: Copy>(
        &self,
        candidates: impl IntoIterator<Item = (CellId, T)>,
    ) -> Result<Option<(CellId, T)>, MeshTopologyError> {
        let mut best: Option<(MinimumRuleKey, (CellId, T))> = None;
        for (cell, data) in candidates {
            let key = MinimumRuleKey::for_cell(self.mesh, cell)?;
            if best.as_ref().map_or(true, |(best_key, _)| key < *best_key) {
                best = Some((key, (cell, data)));
            }
        }
        Ok(best.map(|(_, winner)| winner))
    }

    pub fn edge_constraint(&mut self, e: EdgeIndex) -> Result<EdgeConstraint, MeshTopologyError> {
        if let Some(constraint) = self.edges.get(&e) {
            return Ok(*constraint);
        }
        let topology = self.mesh.topology();
        let mut constraining = None;
        for ancestor in topology.edge_ancestry(e)? {
            let sides = topology.active_edge_sides(ancestor);
            if !sides.is_empty() {
                constraining = Some((ancestor, sides));
            }
        }
        let (edge, sides) = constraining.ok_or(MeshTopologyError::UnresolvableOwnership {
            dimension: 1,
            entity: e,
        })?;
        let (cell, side) = self
            .minimum_rule_winner(sides)?
            .ok_or(MeshTopologyError::UnresolvableOwnership {
                dimension: 1,
                entity: edge,
            })?;
        let constraint = EdgeConstraint { edge, cell, side };
        self.edges.insert(e, constraint);
        Ok(constraint)
    }

    pub fn vertex_constraint(&mut self, v: VertexIndex) -> Result<VertexConstraint, MeshTopologyError> {
        if let Some(constraint) = self.vertices.get(&v) {
            return Ok(*constraint);
        }
        let topology = self.mesh.topology();
        let mut hanging_on = None;
        if let Some(parent_edge) = topology.vertex(v).parent_edge() {
            if parent_edge >= topology.edge_count() {
                return Err(MeshTopologyError::DanglingConstraint { vertex: v });
            }
            for ancestor in topology.edge_ancestry(parent_edge)? {
                if !topology.active_edge_sides(ancestor).is_empty() {
                    hanging_on = Some(ancestor);
                }
            }
        }
        let constraint = match hanging_on {
            Some(edge) => {
                if topology.vertex_parameter_on_edge(v, edge).is_none() {
                    return Err(MeshTopologyError::DanglingConstraint { vertex: v });
                }
                VertexConstraint::Hanging { edge }
            }
            None => {
                let cells = topology.active_vertex_cells(v);
                let (owner, _) = self
                    .minimum_rule_winner(cells.into_iter().map(|cell| (cell, ())))?
                    .ok_or(MeshTopologyError::UnresolvableOwnership {
                        dimension: 0,
                        entity: v,
                    })?;
                VertexConstraint::Free { owner }
            }
        };
        self.vertices.insert(v, constraint);
        Ok(constraint)
    }

    /// Constraint and ownership information for every subcell of an active cell.
    pub fn cell_constraints(&mut self, cell_id: CellId) -> Result<CellConstraints, MeshTopologyError> {
        let cell = self.mesh.topology().active_cell(cell_id)?.clone();
        let topology = cell.topology();
        let dim = topology.dimension();
        let mut subcell_constraints = vec![Vec::new(); dim + 1];
        let mut owner_for_subcell = vec![Vec::new(); dim + 1];

        for (local_vertex, &v) in cell.vertices().iter().enumerate() {
            let (constraint, owner) = match self.vertex_constraint(v)? {
                VertexConstraint::Free { owner } => {
                    let owner_cell = self.mesh.cell(owner)?;
                    let ordinal_in_owner = owner_cell
                        .local_vertex(v)
                        .ok_or(MeshTopologyError::UnresolvableOwnership { dimension: 0, entity: v })?;
                    let constraint = ConstrainingSubcellInfo {
                        cell_id: owner,
                        side_ordinal: Some(ordinal_in_owner),
                        subcell_ordinal_in_side: 0,
                        dimension: 0,
                    };
                    let owner = OwnershipInfo {
                        cell_id: owner,
                        owning_subcell_entity_index: v,
                        dimension: 0,
                    };
                    (constraint, owner)
                }
                VertexConstraint::Hanging { edge } => {
                    let edge_constraint = self.edge_constraint(edge)?;
                    let constraint = ConstrainingSubcellInfo {
                        cell_id: edge_constraint.cell,
                        side_ordinal: Some(edge_constraint.side),
                        subcell_ordinal_in_side: 0,
                        dimension: 1,
                    };
                    let owner = OwnershipInfo {
                        cell_id: edge_constraint.cell,
                        owning_subcell_entity_index: edge,
                        dimension: 1,
                    };
                    (constraint, owner)
                }
            };
            debug_assert_eq!(subcell_constraints[0].len(), local_vertex);
            subcell_constraints[0].push(constraint);
            owner_for_subcell[0].push(owner);
        }

        if topology == CellTopology::Quadrilateral {
            for &e in cell.sides() {
                let edge_constraint = self.edge_constraint(e)?;
                subcell_constraints[1].push(ConstrainingSubcellInfo {
                    cell_id: edge_constraint.cell,
                    side_ordinal: Some(edge_constraint.side),
                    subcell_ordinal_in_side: 0,
                    dimension: 1,
                });
                owner_for_subcell[1].push(OwnershipInfo {
                    cell_id: edge_constraint.cell,
                    owning_subcell_entity_index: edge_constraint.edge,
                    dimension: 1,
                });
            }
        }

        subcell_constraints[dim].push(ConstrainingSubcellInfo {
            cell_id,
            side_ordinal: None,
            subcell_ordinal_in_side: 0,
            dimension: dim,
        });
        owner_for_subcell[dim].push(OwnershipInfo {
            cell_id,
            owning_subcell_entity_index: cell_id,
            dimension: dim,
        });

        Ok(CellConstraints {
            subcell_constraints,
            owner_for_subcell,
        })
    }
}
