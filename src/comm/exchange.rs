use crate::comm::{CommPattern, Communicator};
use crate::error::CommError;
use crate::grid::StructGrid;
use crate::matrix::DataBox;
use crate::util::*;
use std::collections::BTreeMap;

/// Storage that takes part in a ghost exchange.
/// Values are addressed by local box and linear index into `data_box`,
/// each point carries `components` values.
pub trait GhostField<const GRID_DIMENSION: usize> {
    fn components(&self) -> usize;

    fn data_box(&self, local_box: usize) -> &DataBox<GRID_DIMENSION>;

    fn pack(&self, local_box: usize, index: usize, buffer: &mut Vec<f64>);

    fn unpack(&mut self, local_box: usize, index: usize, values: &[f64]);
}

/// Which field of a product a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// Position in the product's matrix list.
    Matrix(usize),
    Mask,
}

#[derive(Debug, Clone, Copy)]
struct Item<const GRID_DIMENSION: usize> {
    slot: usize,
    local_box: usize,
    point: Coord<GRID_DIMENSION>,
}

#[derive(Debug, Clone, Copy)]
struct LocalCopy<const GRID_DIMENSION: usize> {
    slot: usize,
    source: Item<GRID_DIMENSION>,
    dest: Item<GRID_DIMENSION>,
}

/// Several patterns merged into a single exchange round:
/// one message per neighbouring rank, holding every field in slot order.
#[derive(Debug, Clone)]
pub struct CommPkg<const GRID_DIMENSION: usize> {
    fields: Vec<FieldId>,
    sends: BTreeMap<usize, Vec<Item<GRID_DIMENSION>>>,
    recvs: BTreeMap<usize, Vec<Item<GRID_DIMENSION>>>,
    local: Vec<LocalCopy<GRID_DIMENSION>>,
}

/// Proof that an exchange was initiated, consumed by `CommPkg::finalize`.
#[derive(Debug)]
#[must_use]
pub struct CommHandle {
    tag: u64,
}

impl<const GRID_DIMENSION: usize> CommPkg<GRID_DIMENSION> {
    /// Resolve every pattern into what this rank sends, receives and copies.
    pub fn aggregate(
        grid: &StructGrid<GRID_DIMENSION>,
        patterns: Vec<(FieldId, CommPattern<GRID_DIMENSION>)>,
    ) -> Self {
        profiling::scope!("CommPkg::aggregate");
        let me = grid.rank();
        let boxes = grid.boxes();
        let mut fields = Vec::with_capacity(patterns.len());
        let mut sends: BTreeMap<usize, Vec<Item<GRID_DIMENSION>>> =
            BTreeMap::new();
        let mut recvs: BTreeMap<usize, Vec<Item<GRID_DIMENSION>>> =
            BTreeMap::new();
        let mut local = Vec::new();

        for (slot, (field, pattern)) in patterns.into_iter().enumerate() {
            fields.push(field);
            for t in pattern.transfers() {
                let source_rank = boxes[t.source].rank;
                let dest_rank = boxes[t.dest].rank;
                if source_rank != me && dest_rank != me {
                    continue;
                }
                let source = grid.local_index(t.source).map(|local_box| Item {
                    slot,
                    local_box,
                    point: t.source_point,
                });
                let dest = grid.local_index(t.dest).map(|local_box| Item {
                    slot,
                    local_box,
                    point: t.dest_point,
                });
                match (source, dest) {
                    (Some(source), Some(dest)) => {
                        local.push(LocalCopy { slot, source, dest })
                    }
                    (Some(source), None) => {
                        sends.entry(dest_rank).or_default().push(source)
                    }
                    (None, Some(dest)) => {
                        recvs.entry(source_rank).or_default().push(dest)
                    }
                    (None, None) => {}
                }
            }
        }

        log::debug!(
            "rank {}: {} fields, {} send ranks, {} recv ranks, {} local copies",
            me,
            fields.len(),
            sends.len(),
            recvs.len(),
            local.len()
        );
        CommPkg {
            fields,
            sends,
            recvs,
            local,
        }
    }

    /// Fields in slot order, `initiate` and `finalize` expect them in this order.
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    pub fn num_send_ranks(&self) -> usize {
        self.sends.len()
    }

    pub fn num_recv_ranks(&self) -> usize {
        self.recvs.len()
    }

    pub fn num_local_copies(&self) -> usize {
        self.local.len()
    }

    /// Pack and post every outgoing message.
    pub fn initiate<C: Communicator>(
        &self,
        comm: &mut C,
        tag: u64,
        fields: &[&dyn GhostField<GRID_DIMENSION>],
    ) -> Result<CommHandle, CommError> {
        profiling::scope!("CommPkg::initiate");
        debug_assert_eq!(fields.len(), self.fields.len());
        for (dest, items) in &self.sends {
            let mut buffer = Vec::new();
            for item in items {
                let field = fields[item.slot];
                let index = field.data_box(item.local_box).index(&item.point);
                field.pack(item.local_box, index, &mut buffer);
            }
            log::trace!("send {} values to rank {} tag {}", buffer.len(), dest, tag);
            comm.send(*dest, tag, buffer)?;
        }
        Ok(CommHandle { tag })
    }

    /// Perform local copies, then wait for and unpack every incoming message.
    pub fn finalize<C: Communicator>(
        &self,
        handle: CommHandle,
        comm: &mut C,
        fields: &mut [&mut dyn GhostField<GRID_DIMENSION>],
    ) -> Result<(), CommError> {
        profiling::scope!("CommPkg::finalize");
        debug_assert_eq!(fields.len(), self.fields.len());
        let mut buffer = Vec::new();
        for copy in &self.local {
            let field = &mut fields[copy.slot];
            buffer.clear();
            let source_index =
                field.data_box(copy.source.local_box).index(&copy.source.point);
            field.pack(copy.source.local_box, source_index, &mut buffer);
            let dest_index =
                field.data_box(copy.dest.local_box).index(&copy.dest.point);
            field.unpack(copy.dest.local_box, dest_index, &buffer);
        }

        for (source, items) in &self.recvs {
            let payload = comm.recv(*source, handle.tag)?;
            let expected: usize =
                items.iter().map(|i| fields[i.slot].components()).sum();
            if payload.len() != expected {
                return Err(CommError::PayloadSize {
                    rank: *source,
                    expected,
                    found: payload.len(),
                });
            }
            let mut cursor = 0;
            for item in items {
                let field = &mut fields[item.slot];
                let n = field.components();
                let index = field.data_box(item.local_box).index(&item.point);
                field.unpack(item.local_box, index, &payload[cursor..cursor + n]);
                cursor += n;
            }
        }
        Ok(())
    }
}
