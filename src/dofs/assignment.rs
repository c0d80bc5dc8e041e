//! Global DOF numbering.
//!
//! Owned (entity, variable) pairs are numbered in the order partition, increasing cell id,
//! subcell dimension, subcell ordinal, variable id. Local basis functions are then expressed in
//! terms of those global DOFs: functions on owned entities map one-to-one, functions on
//! constrained entities are interpolated from the constraining cell's basis on the constraining
//! edge, recursively for hanging vertices.
use super::constraints::{CellConstraints, ConstraintResolver, VertexConstraint};
use super::local::{LocalDofMapper, MappedGroup};
use super::partition::{BlockPartitionPolicy, PartitionMap, PartitionPolicy};
use super::sub_basis::SubBasisDofMapper;
use super::DofInterpreter;
use crate::element::{interpolation_nodes, lagrange_values, CellTopology};
use crate::error::{DimensionMismatchError, DofError, MeshTopologyError};
use crate::mesh::{EdgeIndex, Mesh, RefinementEvent, RefinementObserver, TopologyVersion, VertexIndex};
use crate::space::{BasisBlock, DofOrdering, FunctionSpace, Subcell, VarFactory, VarId, Variable};
use crate::CellId;
use itertools::Itertools;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, Point2};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// Interpolation weights this close to 0 or 1 are snapped.
const WEIGHT_TOLERANCE: f64 = 1e-12;
const MAX_CONSTRAINT_DEPTH: usize = 64;

/// An (entity, variable) pair carrying global DOFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub dimension: usize,
    /// Vertex index, edge index or cell id, depending on the dimension.
    pub entity: usize,
    pub var: VarId,
}

/// A linear combination of global DOFs.
type Combination = Vec<(usize, f64)>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatrixKey {
    nrows: usize,
    ncols: usize,
    bits: Vec<u64>,
}

impl MatrixKey {
    fn new(matrix: &DMatrix<f64>) -> Self {
        Self {
            nrows: matrix.nrows(),
            ncols: matrix.ncols(),
            bits: matrix.iter().map(|x| x.to_bits()).collect(),
        }
    }
}

/// Number of global DOFs a variable has on an entity of the given dimension, owned by a cell of
/// the given topology and H1 order.
pub fn entity_dof_count(space: FunctionSpace, topology: CellTopology, dimension: usize, h1_order: usize) -> usize {
    let dim = topology.dimension();
    let p = h1_order;
    match space {
        FunctionSpace::HGrad if dimension == 0 => 1,
        FunctionSpace::HGrad if dimension == dim => p.saturating_sub(1).pow(dim as u32),
        FunctionSpace::HGrad => p.saturating_sub(1),
        FunctionSpace::Trace if dimension == 0 => 1,
        FunctionSpace::Trace if dimension == dim => 0,
        FunctionSpace::Trace => p.saturating_sub(1),
        FunctionSpace::L2 if dimension == dim => (FunctionSpace::L2.basis_order(p) + 1).pow(dim as u32),
        FunctionSpace::L2 => 0,
    }
}

/// Minimum-rule DOF numbering of a mesh, distributed over partitions.
///
/// The assignment does not borrow the mesh. It keeps a handle to the mesh's topology version
/// instead, and refuses to interpret data once the mesh has changed, until one of the `did_*`
/// notifications (or [`rebuild_lookups`](Self::rebuild_lookups)) has rebuilt it.
#[derive(Debug)]
pub struct GlobalDofAssignment {
    var_factory: VarFactory,
    partition_policy: Box<dyn PartitionPolicy>,
    version: TopologyVersion,
    built_for_version: u64,
    active_cells: Vec<CellId>,
    partitions: Vec<Vec<CellId>>,
    cell_partitions: FxHashMap<CellId, usize>,
    partition_map: PartitionMap,
    orderings: FxHashMap<(CellTopology, usize), Arc<DofOrdering>>,
    cell_orderings: FxHashMap<CellId, Arc<DofOrdering>>,
    constraints: FxHashMap<CellId, CellConstraints>,
    mappers: FxHashMap<CellId, LocalDofMapper>,
    entity_dofs: FxHashMap<EntityKey, Range<usize>>,
    interned_matrices: FxHashMap<MatrixKey, Arc<DMatrix<f64>>>,
}

impl GlobalDofAssignment {
    pub fn new(
        mesh: &Mesh,
        var_factory: VarFactory,
        partition_policy: impl PartitionPolicy + 'static,
    ) -> Result<Self, DofError> {
        let mut assignment = Self {
            var_factory,
            partition_policy: Box::new(partition_policy),
            version: mesh.version_handle(),
            built_for_version: mesh.version(),
            active_cells: Vec::new(),
            partitions: Vec::new(),
            cell_partitions: FxHashMap::default(),
            partition_map: PartitionMap::from_counts(&[]),
            orderings: FxHashMap::default(),
            cell_orderings: FxHashMap::default(),
            constraints: FxHashMap::default(),
            mappers: FxHashMap::default(),
            entity_dofs: FxHashMap::default(),
            interned_matrices: FxHashMap::default(),
        };
        assignment.rebuild_lookups(mesh)?;
        Ok(assignment)
    }

    /// An assignment with all cells in a single partition.
    pub fn single_partition(mesh: &Mesh, var_factory: VarFactory) -> Result<Self, DofError> {
        Self::new(mesh, var_factory, BlockPartitionPolicy::default())
    }

    pub fn var_factory(&self) -> &VarFactory {
        &self.var_factory
    }

    pub fn variables(&self) -> &[Variable] {
        self.var_factory.variables()
    }

    /// The topology version the lookups were built for.
    pub fn built_for_version(&self) -> u64 {
        self.built_for_version
    }

    pub fn is_current(&self) -> bool {
        self.version.get() == self.built_for_version
    }

    fn check_current(&self) -> Result<(), DofError> {
        let current = self.version.get();
        if current == self.built_for_version {
            Ok(())
        } else {
            Err(DofError::StaleLookups {
                built: self.built_for_version,
                current,
            })
        }
    }

    fn ordering_for(&mut self, topology: CellTopology, h1_order: usize) -> Arc<DofOrdering> {
        let variables = self.var_factory.variables();
        self.orderings
            .entry((topology, h1_order))
            .or_insert_with(|| Arc::new(DofOrdering::new(topology, h1_order, variables)))
            .clone()
    }

    /// Recomputes constraints, ownership, the numbering and all local mappers from scratch.
    pub fn rebuild_lookups(&mut self, mesh: &Mesh) -> Result<(), DofError> {
        self.version = mesh.version_handle();
        let active_cells = mesh.active_cells();
        let mut partitions = self.partition_policy.partition(&active_cells);
        let mut cell_partitions = FxHashMap::default();
        for (k, cells) in partitions.iter_mut().enumerate() {
            cells.sort_unstable();
            for &cell in cells.iter() {
                mesh.topology().active_cell(cell)?;
                cell_partitions.insert(cell, k);
            }
        }
        DimensionMismatchError::check("partitioned active cells", active_cells.len(), cell_partitions.len())?;

        let mut resolver = ConstraintResolver::new(mesh);
        let mut constraints = FxHashMap::default();
        let mut cell_orderings = FxHashMap::default();
        for &cell in &active_cells {
            constraints.insert(cell, resolver.cell_constraints(cell)?);
            let c = mesh.cell(cell)?;
            cell_orderings.insert(cell, self.ordering_for(c.topology(), c.h1_order()));
        }

        let (entity_dofs, counts) =
            number_owned_entities(mesh, self.var_factory.variables(), &partitions, &constraints)?;
        let partition_map = PartitionMap::from_counts(&counts);

        let mut interned_matrices = FxHashMap::default();
        let mut mappers = FxHashMap::default();
        {
            let mut builder = MapperBuilder {
                mesh,
                resolver: &mut resolver,
                entity_dofs: &entity_dofs,
                interned: &mut interned_matrices,
            };
            for &cell in &active_cells {
                let ordering = &cell_orderings[&cell];
                mappers.insert(cell, builder.build(cell, ordering)?);
            }
        }

        self.built_for_version = mesh.version();
        self.active_cells = active_cells;
        self.partitions = partitions;
        self.cell_partitions = cell_partitions;
        self.partition_map = partition_map;
        self.cell_orderings = cell_orderings;
        self.constraints = constraints;
        self.mappers = mappers;
        self.entity_dofs = entity_dofs;
        self.interned_matrices = interned_matrices;
        debug!(
            "rebuilt DOF lookups at version {}: {} global DOFs on {} cells in {} partitions, {} distinct constraint matrices",
            self.built_for_version,
            self.partition_map.global_dof_count(),
            self.active_cells.len(),
            self.partitions.len(),
            self.interned_matrices.len()
        );
        Ok(())
    }

    pub fn did_h_refine(&mut self, mesh: &Mesh, cells: &[CellId]) -> Result<(), DofError> {
        debug!("{} cells were h-refined", cells.len());
        self.rebuild_lookups(mesh)
    }

    pub fn did_p_refine(&mut self, mesh: &Mesh, cells: &[CellId], delta_p: usize) -> Result<(), DofError> {
        debug!("{} cells were p-refined by {}", cells.len(), delta_p);
        self.rebuild_lookups(mesh)
    }

    pub fn did_h_unrefine(&mut self, mesh: &Mesh, cells: &[CellId]) -> Result<(), DofError> {
        debug!("{} cells were h-unrefined", cells.len());
        self.rebuild_lookups(mesh)
    }

    pub fn did_change_partition_policy(
        &mut self,
        mesh: &Mesh,
        partition_policy: impl PartitionPolicy + 'static,
    ) -> Result<(), DofError> {
        self.partition_policy = Box::new(partition_policy);
        self.rebuild_lookups(mesh)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Active cells of a partition, in increasing order.
    pub fn partition_cells(&self, partition: usize) -> &[CellId] {
        &self.partitions[partition]
    }

    pub fn partition_dof_count(&self, partition: usize) -> usize {
        self.partition_map.partition_dof_count(partition)
    }

    pub fn partition_dof_offset(&self, partition: usize) -> usize {
        self.partition_map.partition_dof_offset(partition)
    }

    pub fn partition_dof_counts(&self) -> Vec<usize> {
        self.partition_map.partition_dof_counts()
    }

    pub fn partition_for_global_dof_index(&self, index: usize) -> Option<usize> {
        self.partition_map.partition_for_global_dof_index(index)
    }

    pub fn global_dof_indices_for_partition(&self, partition: usize) -> Vec<usize> {
        self.partition_map.partition_range(partition).collect()
    }

    pub fn cell_constraints(&self, cell: CellId) -> Result<&CellConstraints, DofError> {
        self.check_current()?;
        self.constraints
            .get(&cell)
            .ok_or(DofError::MeshTopology(MeshTopologyError::InactiveCell(cell)))
    }

    pub fn local_dof_mapper(&self, cell: CellId) -> Result<&LocalDofMapper, DofError> {
        self.check_current()?;
        self.mappers
            .get(&cell)
            .ok_or(DofError::MeshTopology(MeshTopologyError::InactiveCell(cell)))
    }

    /// Global DOFs of an owned (entity, variable) pair.
    pub fn entity_dofs(&self, dimension: usize, entity: usize, var: VarId) -> Option<Range<usize>> {
        self.entity_dofs
            .get(&EntityKey { dimension, entity, var })
            .cloned()
    }

    /// Number of distinct constraint matrices shared by all constrained sub-basis mappers.
    pub fn distinct_constraint_matrices(&self) -> usize {
        self.interned_matrices.len()
    }

    /// Scatters data given for the basis of one variable (or one side of a trace variable).
    pub fn interpret_local_basis_data(
        &self,
        cell: CellId,
        var: VarId,
        side: Option<usize>,
        basis_data: &DVector<f64>,
    ) -> Result<(DVector<f64>, Vec<usize>), DofError> {
        let mapper = self.local_dof_mapper(cell)?;
        let ordering = self.dof_ordering(cell)?;
        let block = ordering
            .block(var, side)
            .ok_or(DofError::UnknownVariable(var))?;
        DimensionMismatchError::check("basis data length", block.len(), basis_data.len())?;
        let mut accumulated = BTreeMap::new();
        for group in mapper.groups_for(var, side) {
            let sub = &group.mapper;
            let filtered = DMatrix::from_iterator(
                sub.basis_dof_ordinal_filter().len(),
                1,
                sub.basis_dof_ordinal_filter()
                    .iter()
                    .map(|&local| basis_data[local - block.offset()]),
            );
            let mapped = sub.map_data(false, &filtered)?;
            for (j, &global) in sub.mapped_global_dof_ordinals().iter().enumerate() {
                *accumulated.entry(global).or_insert(0.0) += mapped[(j, 0)];
            }
        }
        let values = DVector::from_iterator(accumulated.len(), accumulated.values().copied());
        Ok((values, accumulated.into_keys().collect()))
    }

    /// Global DOFs of a variable on the boundary sides whose physical midpoint passes the filter.
    pub fn boundary_global_dofs(
        &self,
        mesh: &Mesh,
        var: VarId,
        filter: impl Fn(&Point2<f64>) -> bool,
    ) -> Result<Vec<usize>, DofError> {
        self.check_current()?;
        let mut dofs = Vec::new();
        for &cell in &self.active_cells {
            let topology = mesh.cell(cell)?.topology();
            let geometry = mesh.topology().cell_geometry(cell)?;
            let ordering = self.dof_ordering(cell)?;
            let mapper = self.local_dof_mapper(cell)?;
            for side in 0..topology.side_count() {
                if !mesh.topology().is_boundary_side(cell, side)? {
                    continue;
                }
                let midpoint = geometry.map_reference_coords(&topology.side_point(side, 0.0));
                if !filter(&midpoint) {
                    continue;
                }
                let local_dofs: Vec<usize> = ordering
                    .blocks_for_var(var)
                    .filter(|block| block.side().map_or(true, |s| s == side))
                    .flat_map(|block| side_local_dofs(block, topology, side))
                    .collect();
                for group in mapper.groups() {
                    let sub = &group.mapper;
                    for (i, local) in sub.basis_dof_ordinal_filter().iter().enumerate() {
                        if !local_dofs.contains(local) {
                            continue;
                        }
                        for (j, &global) in sub.mapped_global_dof_ordinals().iter().enumerate() {
                            if sub.weight(i, j) != 0.0 {
                                dofs.push(global);
                            }
                        }
                    }
                }
            }
        }
        dofs.sort_unstable();
        dofs.dedup();
        Ok(dofs)
    }

    /// Human-readable description of the constraints and DOF mappers of a cell.
    pub fn constraint_info(&self, cell: CellId) -> Result<String, DofError> {
        let constraints = self.cell_constraints(cell)?;
        let mapper = self.local_dof_mapper(cell)?;
        let mut info = format!("cell {} (partition {:?}):\n{}", cell, self.cell_partition(cell), constraints);
        for group in mapper.groups() {
            let sub = &group.mapper;
            info.push_str(&format!(
                "  var {} side {:?} subcell {:?}: local {:?} -> global {:?}{}\n",
                group.var,
                group.side,
                group.subcell,
                sub.basis_dof_ordinal_filter(),
                sub.mapped_global_dof_ordinals(),
                if sub.is_direct() { "" } else { " (constrained)" }
            ));
        }
        Ok(info)
    }
}

/// Local DOFs of a block whose nodes lie on a side of the cell.
fn side_local_dofs(block: &BasisBlock, topology: CellTopology, side: usize) -> Vec<usize> {
    if block.side().is_some() {
        return block.local_indices().collect();
    }
    block
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| node.subcell.dimension < topology.dimension() && topology.is_on_side(side, &node.reference_point))
        .map(|(n, _)| block.offset() + n)
        .collect()
}

fn number_owned_entities(
    mesh: &Mesh,
    variables: &[Variable],
    partitions: &[Vec<CellId>],
    constraints: &FxHashMap<CellId, CellConstraints>,
) -> Result<(FxHashMap<EntityKey, Range<usize>>, Vec<usize>), DofError> {
    let mut entity_dofs = FxHashMap::default();
    let mut counts = Vec::with_capacity(partitions.len());
    let mut next = 0;
    for cells in partitions {
        let partition_start = next;
        for &cell in cells {
            let c = mesh.cell(cell)?;
            let topology = c.topology();
            let cell_constraints = &constraints[&cell];
            for dimension in 0..=topology.dimension() {
                for ordinal in 0..topology.subcell_count(dimension) {
                    let owner = cell_constraints.owner(dimension, ordinal);
                    if owner.cell_id != cell || owner.dimension != dimension {
                        continue;
                    }
                    for var in variables {
                        let count = entity_dof_count(var.space(), topology, dimension, c.h1_order());
                        let key = EntityKey {
                            dimension,
                            entity: owner.owning_subcell_entity_index,
                            var: var.id(),
                        };
                        if count > 0 && !entity_dofs.contains_key(&key) {
                            entity_dofs.insert(key, next..next + count);
                            next += count;
                        }
                    }
                }
            }
        }
        counts.push(next - partition_start);
    }
    Ok((entity_dofs, counts))
}

fn snap(weight: f64) -> f64 {
    if weight.abs() < WEIGHT_TOLERANCE {
        0.0
    } else if (weight - 1.0).abs() < WEIGHT_TOLERANCE {
        1.0
    } else {
        weight
    }
}

/// Sums duplicate global DOFs and drops vanishing weights.
fn normalize(combination: Combination) -> Combination {
    combination
        .into_iter()
        .sorted_by_key(|&(global, _)| global)
        .coalesce(|(g1, w1), (g2, w2)| if g1 == g2 { Ok((g1, w1 + w2)) } else { Err(((g1, w1), (g2, w2))) })
        .map(|(global, weight)| (global, snap(weight)))
        .filter(|&(_, weight)| weight != 0.0)
        .collect()
}

/// Expresses local basis functions in terms of the numbered global DOFs.
struct MapperBuilder<'a, 'm> {
    mesh: &'m Mesh,
    resolver: &'a mut ConstraintResolver<'m>,
    entity_dofs: &'a FxHashMap<EntityKey, Range<usize>>,
    interned: &'a mut FxHashMap<MatrixKey, Arc<DMatrix<f64>>>,
}

impl<'a, 'm> MapperBuilder<'a, 'm> {
    fn entity_range(&self, dimension: usize, entity: usize, var: VarId) -> Result<&Range<usize>, MeshTopologyError> {
        self.entity_dofs
            .get(&EntityKey { dimension, entity, var })
            .ok_or(MeshTopologyError::UnresolvableOwnership { dimension, entity })
    }

    fn vertex_combination(&mut self, v: VertexIndex, var: VarId, depth: usize) -> Result<Combination, MeshTopologyError> {
        if depth > MAX_CONSTRAINT_DEPTH {
            return Err(MeshTopologyError::CyclicConstraint {
                dimension: 0,
                entity: v,
            });
        }
        match self.resolver.vertex_constraint(v)? {
            VertexConstraint::Free { .. } => Ok(vec![(self.entity_range(0, v, var)?.start, 1.0)]),
            VertexConstraint::Hanging { edge } => {
                let t = self
                    .mesh
                    .topology()
                    .vertex_parameter_on_edge(v, edge)
                    .ok_or(MeshTopologyError::DanglingConstraint { vertex: v })?;
                self.edge_combination(edge, t, var, depth + 1)
            }
        }
    }

    /// The constraining cell's side basis on a constraining edge, evaluated at edge parameter `t`.
    fn edge_combination(&mut self, edge: EdgeIndex, t: f64, var: VarId, depth: usize) -> Result<Combination, MeshTopologyError> {
        if depth > MAX_CONSTRAINT_DEPTH {
            return Err(MeshTopologyError::CyclicConstraint {
                dimension: 1,
                entity: edge,
            });
        }
        let constraint = self.resolver.edge_constraint(edge)?;
        let order = self.mesh.cell(constraint.cell)?.h1_order();
        let [v0, v1] = self.mesh.topology().edge(constraint.edge).vertices();
        let weights = lagrange_values(&interpolation_nodes(order), t);
        let mut combination = Vec::new();
        for (j, weight) in weights.into_iter().enumerate() {
            let weight = snap(weight);
            if weight == 0.0 {
                continue;
            }
            let contributions = if j == 0 {
                self.vertex_combination(v0, var, depth + 1)?
            } else if j == order {
                self.vertex_combination(v1, var, depth + 1)?
            } else {
                vec![(self.entity_range(1, constraint.edge, var)?.start + j - 1, 1.0)]
            };
            combination.extend(contributions.into_iter().map(|(g, w)| (g, weight * w)));
        }
        Ok(normalize(combination))
    }

    /// Combination for a node in the interior of side `side` of an active quadrilateral.
    fn side_node_combination(
        &mut self,
        cell: CellId,
        side: usize,
        reference_point: &Point2<f64>,
        var: VarId,
    ) -> Result<Combination, MeshTopologyError> {
        let topology = self.mesh.topology();
        let c = topology.cell(cell)?;
        let e = c.sides()[side];
        let t = c.topology().side_parameter(side, reference_point);
        let side_start = c.vertices()[c.topology().side_vertices(side)[0]];
        let t = if side_start == topology.edge(e).vertices()[0] { t } else { -t };
        let constraint = self.resolver.edge_constraint(e)?;
        let t = topology
            .edge_parameter_in_ancestor(e, t, constraint.edge)
            .ok_or(MeshTopologyError::UnresolvableOwnership {
                dimension: 1,
                entity: e,
            })?;
        self.edge_combination(constraint.edge, t, var, 0)
    }

    fn build(&mut self, cell: CellId, ordering: &DofOrdering) -> Result<LocalDofMapper, DofError> {
        let c = self.mesh.topology().active_cell(cell)?;
        let dim = c.topology().dimension();
        let vertices = c.vertices().to_vec();
        let mut groups = Vec::new();
        for block in ordering.blocks() {
            let var = block.var();
            let mut by_subcell: BTreeMap<Subcell, Vec<usize>> = BTreeMap::new();
            for (n, node) in block.nodes().iter().enumerate() {
                by_subcell.entry(node.subcell).or_default().push(n);
            }
            for (subcell, nodes) in by_subcell {
                let mut combinations = Vec::with_capacity(nodes.len());
                for (k, &n) in nodes.iter().enumerate() {
                    let node = &block.nodes()[n];
                    let combination = if subcell.dimension == dim {
                        vec![(self.entity_range(dim, cell, var)?.start + k, 1.0)]
                    } else if subcell.dimension == 0 {
                        self.vertex_combination(vertices[subcell.ordinal], var, 0)?
                    } else {
                        self.side_node_combination(cell, subcell.ordinal, &node.reference_point, var)?
                    };
                    combinations.push(combination);
                }
                let filter: Vec<usize> = nodes.iter().map(|&n| block.offset() + n).collect();
                let mapper = self.sub_basis_mapper(filter, &combinations)?;
                groups.push(MappedGroup {
                    var,
                    side: block.side(),
                    subcell,
                    mapper,
                });
            }
        }
        Ok(LocalDofMapper::new(ordering.local_dof_count(), groups))
    }

    fn sub_basis_mapper(
        &mut self,
        filter: Vec<usize>,
        combinations: &[Combination],
    ) -> Result<SubBasisDofMapper, DimensionMismatchError> {
        let unit_targets: Option<Vec<usize>> = combinations
            .iter()
            .map(|combination| match combination.as_slice() {
                [(global, weight)] if *weight == 1.0 => Some(*global),
                _ => None,
            })
            .collect();
        if let Some(globals) = unit_targets {
            let distinct: FxHashSet<usize> = globals.iter().copied().collect();
            if distinct.len() == globals.len() {
                return SubBasisDofMapper::direct(filter, globals);
            }
        }

        let columns: Vec<usize> = combinations
            .iter()
            .flatten()
            .map(|&(global, _)| global)
            .sorted()
            .dedup()
            .collect();
        let mut matrix = DMatrix::zeros(combinations.len(), columns.len());
        for (i, combination) in combinations.iter().enumerate() {
            for &(global, weight) in combination {
                if let Ok(j) = columns.binary_search(&global) {
                    matrix[(i, j)] += weight;
                }
            }
        }
        let matrix = self
            .interned
            .entry(MatrixKey::new(&matrix))
            .or_insert_with(|| Arc::new(matrix))
            .clone();
        SubBasisDofMapper::constrained(filter, columns, matrix)
    }
}

impl DofInterpreter for GlobalDofAssignment {
    fn global_dof_count(&self) -> usize {
        self.partition_map.global_dof_count()
    }

    fn partition_map(&self) -> &PartitionMap {
        &self.partition_map
    }

    fn active_cells(&self) -> &[CellId] {
        &self.active_cells
    }

    fn cell_partition(&self, cell: CellId) -> Option<usize> {
        self.cell_partitions.get(&cell).copied()
    }

    fn dof_ordering(&self, cell: CellId) -> Result<Arc<DofOrdering>, DofError> {
        self.check_current()?;
        self.cell_orderings
            .get(&cell)
            .cloned()
            .ok_or(DofError::MeshTopology(MeshTopologyError::InactiveCell(cell)))
    }

    fn cell_global_dofs(&self, cell: CellId) -> Result<Vec<usize>, DofError> {
        Ok(self.local_dof_mapper(cell)?.global_dofs().to_vec())
    }

    fn interpret_local_data(
        &self,
        cell: CellId,
        local: &DVector<f64>,
        accumulate: bool,
    ) -> Result<(DVector<f64>, Vec<usize>), DofError> {
        let mapper = self.local_dof_mapper(cell)?;
        let values = mapper.map_local_data(local, accumulate)?;
        Ok((values, mapper.global_dofs().to_vec()))
    }

    fn interpret_local_matrix(&self, cell: CellId, local: &DMatrix<f64>) -> Result<(DMatrix<f64>, Vec<usize>), DofError> {
        let mapper = self.local_dof_mapper(cell)?;
        let matrix = mapper.map_local_matrix(local)?;
        Ok((matrix, mapper.global_dofs().to_vec()))
    }

    fn interpret_global_data(
        &self,
        cell: CellId,
        local: &mut DVector<f64>,
        global: DVectorView<f64>,
        accumulate: bool,
    ) -> Result<(), DofError> {
        DimensionMismatchError::check("global data length", self.global_dof_count(), global.len())?;
        let mapper = self.local_dof_mapper(cell)?;
        mapper.map_global_data(global, local, accumulate)?;
        Ok(())
    }

    fn local_to_global_operator(&self, cell: CellId) -> Result<(DMatrix<f64>, Vec<usize>), DofError> {
        let mapper = self.local_dof_mapper(cell)?;
        Ok((mapper.local_to_global_matrix(), mapper.global_dofs().to_vec()))
    }

    fn direct_local_dofs(&self, cell: CellId) -> Result<Vec<(usize, usize)>, DofError> {
        Ok(self.local_dof_mapper(cell)?.direct_local_dofs())
    }

    fn interpret_local_coefficients(
        &self,
        cell: CellId,
        local: &DVector<f64>,
    ) -> Result<(DVector<f64>, Vec<usize>), DofError> {
        Ok(self.local_dof_mapper(cell)?.fit_local_coefficients(local)?)
    }
}

impl RefinementObserver for GlobalDofAssignment {
    fn mesh_changed(&mut self, mesh: &Mesh, event: &RefinementEvent) -> Result<(), DofError> {
        match event {
            RefinementEvent::HRefined { cells, .. } => self.did_h_refine(mesh, cells),
            RefinementEvent::PRefined { cells, delta_p } => self.did_p_refine(mesh, cells, *delta_p),
            RefinementEvent::HUnrefined { cells } => self.did_h_unrefine(mesh, cells),
        }
    }
}
