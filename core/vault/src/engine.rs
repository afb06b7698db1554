//! Scatter/gather engine.
//!
//! Write path:
//!
//! ```text
//! plaintext -> shards -> shard streams (+ CRC trailer)
//!           -> per-unit coordinate -> candidate -> lane address
//!           -> masked cell writes + decoy touches -> one batch commit
//! ```
//!
//! The read path recomputes the same placements from the key and the file
//! record, unmasks, verifies each shard trailer and decodes. Nothing about
//! the layout is stored anywhere.
//!
//! Files share the medium. A new placement passes over the real cells of
//! the other live files and records, per displaced unit, how many free
//! probe positions it skipped, so the read path can replay it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::layout::{Displacement, FileRecord, Occupancy, ScatterLayout, ShardLayout};
use dimvault_addressing::{
    bootstrap_digest, AddressProjector, CandidateSet, CoordinateGenerator, PhysicalAddress,
    UnitScope, SEMANTIC_BOOTSTRAP_UNITS,
};
use dimvault_common::{Error, FileId, Result};
use dimvault_crypto::{Axis, AxisSubKeys, DensityBand, EntropicMixer, MasterKey};
use dimvault_storage::{
    open_shard, seal_shard, RedundancyCodec, ShardGroup, StorageMedium, WriteBatch, BLOCK_SIZE,
};

/// Cells written per call while formatting.
const FORMAT_CHUNK: usize = 16 * BLOCK_SIZE as usize;

/// Tunables of the scatter engine, stored with the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Real-to-touched ratio band per density region.
    pub density: DensityBand,
    /// Upper bound on decoy touches per real unit.
    pub max_decoys: usize,
    /// Largest share of a lane one shard stream may occupy.
    pub max_lane_load: f64,
}

impl EngineConfig {
    pub fn with_density(mut self, density: DensityBand) -> Self {
        self.density = density;
        self
    }

    pub fn with_max_decoys(mut self, max_decoys: usize) -> Self {
        self.max_decoys = max_decoys;
        self
    }

    pub fn with_max_lane_load(mut self, max_lane_load: f64) -> Self {
        self.max_lane_load = max_lane_load;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.density.validate()?;
        if !(self.max_lane_load > 0.0 && self.max_lane_load < 1.0) {
            return Err(Error::InvalidInput(
                "max_lane_load must be in (0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            density: DensityBand::default(),
            max_decoys: 8,
            max_lane_load: 0.5,
        }
    }
}

/// Result of committing a file into its next generation.
///
/// The new layout is on the medium; the caller switches the file record to
/// `record` and then retires `retired`.
#[derive(Debug)]
pub struct GenerationSwitch {
    pub record: FileRecord,
    pub placed: ScatterLayout,
    pub retired: ScatterLayout,
}

/// Per-call key material.
struct Keyring {
    axes: AxisSubKeys,
    mixer: EntropicMixer,
}

struct Placement {
    address: PhysicalAddress,
    context: u64,
    candidates: CandidateSet,
    selector: u8,
}

/// Assigns cells to the units of one shard stream, in unit order.
///
/// A unit walks its probe order (every candidate selector, then its lane
/// from the base candidate on) and takes the first cell the stream has not
/// claimed yet, after passing over as many unclaimed cells as its recorded
/// skip. A placer with `avoid` set passes over other files' cells instead
/// and records each skip it makes.
struct ShardPlacer<'a> {
    projector: &'a AddressProjector,
    shard: u16,
    lane: u64,
    lanes: u64,
    claimed: HashSet<PhysicalAddress>,
    skips: HashMap<u64, u32>,
    avoid: Option<&'a Occupancy>,
    displaced: Vec<Displacement>,
}

impl<'a> ShardPlacer<'a> {
    /// Replays the placement recorded in `record`.
    fn replay(projector: &'a AddressProjector, record: &FileRecord, shard: usize) -> Self {
        Self {
            projector,
            shard: shard as u16,
            lane: record.lane(shard),
            lanes: record.lanes(),
            claimed: HashSet::with_capacity(record.stream_len() as usize),
            skips: record.skips(shard),
            avoid: None,
            displaced: Vec::new(),
        }
    }

    /// Places a new generation clear of `occupied`.
    fn fresh(
        projector: &'a AddressProjector,
        record: &FileRecord,
        shard: usize,
        occupied: &'a Occupancy,
    ) -> Self {
        Self {
            skips: HashMap::new(),
            avoid: Some(occupied),
            ..Self::replay(projector, record, shard)
        }
    }

    fn place(&mut self, generator: &CoordinateGenerator, unit: u64) -> Option<Placement> {
        let base = generator.coordinate(unit);
        let candidates = CandidateSet::new(base);
        // context 0 is reserved for background filler
        let context = u64::from(base.component(Axis::Entropic)) + 1;

        let (projector, lane, lanes) = (self.projector, self.lane, self.lanes);
        let selected = candidates.selectors().map(move |selector| {
            let address = projector.project_striped(&candidates.candidate(selector), lane, lanes);
            (selector, address)
        });
        let start = projector.project_striped(&base, lane, lanes);
        let walk = std::iter::successors(Some(start), move |&address| {
            Some(projector.next_in_lane(address, lanes))
        })
        .take(projector.lane_slots(lanes) as usize)
        .map(|address| (0, address));

        let skip = self.skips.get(&unit).copied().unwrap_or(0);
        let mut passed = 0u32;
        for (selector, address) in selected.chain(walk) {
            if self.claimed.contains(&address) {
                continue;
            }
            let take = match self.avoid {
                Some(occupied) => !occupied.contains(address),
                None => passed == skip,
            };
            if !take {
                passed = passed.saturating_add(1);
                continue;
            }

            self.claimed.insert(address);
            if self.avoid.is_some() && passed > 0 {
                self.displaced.push(Displacement {
                    shard: self.shard,
                    unit,
                    skip: passed,
                });
            }
            return Some(Placement {
                address,
                context,
                candidates,
                selector,
            });
        }
        None
    }

    /// Error for a unit that found no cell.
    fn exhausted(&self, file_id: &FileId) -> Error {
        match self.avoid {
            Some(_) => Error::InvalidInput(format!(
                "No free cell left in lane {} for '{}'",
                self.lane, file_id
            )),
            None => Error::CorruptedLayout(format!(
                "Recorded placement of '{}' runs past its lane",
                file_id
            )),
        }
    }
}

/// Shards read back from the medium, with the cells they were found at.
struct Recovery {
    shards: Vec<Option<Vec<u8>>>,
    layout: ScatterLayout,
}

impl Recovery {
    fn intact(&self) -> usize {
        self.shards.iter().filter(|s| s.is_some()).count()
    }
}

struct StagedWrite {
    batch: WriteBatch,
    layout: ScatterLayout,
    displaced: Vec<Displacement>,
    decoys: usize,
}

/// Scatters files over a medium and gathers them back.
///
/// Stateless apart from its configuration; every call takes the master key.
/// Callers that keep several files on one medium pass the [`Occupancy`] of
/// the other files to every call that places or wipes cells.
#[derive(Debug, Clone, Default)]
pub struct ScatterEngine {
    config: EngineConfig,
}

impl ScatterEngine {
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn keyring(&self, key: &MasterKey) -> Keyring {
        let axes = key.axis_keys();
        let mixer = EntropicMixer::new(&axes, self.config.density);
        Keyring { axes, mixer }
    }

    /// Fill the whole medium with background filler.
    ///
    /// # Postconditions
    /// - Every cell holds `filler(address, 0)`
    pub async fn format(&self, key: &MasterKey, medium: &dyn StorageMedium) -> Result<()> {
        let keys = self.keyring(key);
        let size = medium.size();
        let mut buf = vec![0u8; FORMAT_CHUNK];
        let mut offset = 0u64;
        while offset < size {
            let len = (size - offset).min(FORMAT_CHUNK as u64) as usize;
            keys.mixer.fill_block(offset, &mut buf[..len]);
            medium.write(offset, &buf[..len]).await?;
            offset += len as u64;
        }
        medium.flush().await?;
        info!(medium = medium.name(), size, "Formatted medium");
        Ok(())
    }

    /// Real cells of `files` as they lie on the medium.
    ///
    /// Only the bootstrap prefix of each shard is read. Files whose record
    /// cannot belong to this medium are skipped with a warning.
    ///
    /// # Errors
    /// - Storage failure
    pub async fn occupancy(
        &self,
        key: &MasterKey,
        files: &BTreeMap<FileId, FileRecord>,
        medium: &dyn StorageMedium,
    ) -> Result<Occupancy> {
        let keys = self.keyring(key);
        let projector = AddressProjector::new(medium.size())?;
        let mut occupancy = Occupancy::new();
        for (file_id, record) in files {
            match self
                .footprint(&keys, file_id, record, &projector, medium)
                .await
            {
                Ok(cells) => occupancy.extend(cells),
                Err(e @ (Error::CorruptedLayout(_) | Error::InvalidInput(_))) => {
                    warn!(file_id = %file_id, error = %e, "Cells of file not located");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(files = files.len(), cells = occupancy.len(), "Collected occupancy");
        Ok(occupancy)
    }

    /// Scatter a new file.
    ///
    /// # Preconditions
    /// - No live layout of `file_id` exists on the medium
    /// - `occupied` holds the real cells of every other live file
    ///
    /// # Postconditions
    /// - The file is committed in generation 0 as one batch
    /// - None of its real cells is in `occupied`
    ///
    /// # Errors
    /// - `InvalidInput` if the file does not fit the lane budget or its
    ///   lanes have no free cell left
    /// - Storage failure (nothing is written)
    #[allow(clippy::too_many_arguments)]
    pub async fn scatter(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        plaintext: &[u8],
        group: ShardGroup,
        temporal_salt: u64,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
    ) -> Result<FileRecord> {
        group.validate()?;
        let keys = self.keyring(key);
        let record = FileRecord::new(plaintext.len(), group, 0, temporal_salt);
        let (record, _) = self
            .commit_generation(&keys, file_id, record, plaintext, None, occupied, None, medium)
            .await?;
        info!(file_id = %file_id, size = plaintext.len(), "Scattered file");
        Ok(record)
    }

    /// Gather a file back into plaintext.
    ///
    /// # Errors
    /// - `CorruptedLayout` if no shard verifies (wrong key or wholesale
    ///   damage) or the record cannot belong to this medium
    /// - `InsufficientShards` if some but fewer than `n_data` shards verify
    pub async fn gather(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        record: &FileRecord,
        medium: &dyn StorageMedium,
    ) -> Result<Vec<u8>> {
        let keys = self.keyring(key);
        let projector = AddressProjector::new(medium.size())?;
        let recovery = self
            .recover(&keys, file_id, record, &projector, medium)
            .await?;
        let plaintext = self.decode(file_id, record, recovery.shards)?;
        debug!(file_id = %file_id, size = plaintext.len(), "Gathered file");
        Ok(plaintext)
    }

    /// Recompute the layout of a file for inspection.
    ///
    /// Complete when the file is recoverable; otherwise it covers the intact
    /// shards and the bootstrap prefixes of the damaged ones.
    pub async fn layout(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        record: &FileRecord,
        medium: &dyn StorageMedium,
    ) -> Result<ScatterLayout> {
        let keys = self.keyring(key);
        let projector = AddressProjector::new(medium.size())?;
        self.locate(&keys, file_id, record, &projector, medium).await
    }

    /// Restore every real cell of a file to background filler.
    ///
    /// Cells in `occupied` are left as they are.
    ///
    /// # Errors
    /// - `CorruptedLayout` if no shard verifies; nothing is written then
    pub async fn delete(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        record: &FileRecord,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
    ) -> Result<()> {
        let keys = self.keyring(key);
        let projector = AddressProjector::new(medium.size())?;
        let layout = self
            .locate(&keys, file_id, record, &projector, medium)
            .await?;
        self.wipe(&keys, &layout, occupied, medium).await?;
        info!(file_id = %file_id, cells = layout.real_cells(), "Deleted file");
        Ok(())
    }

    /// Phase 1 of a rescatter: commit the file into its next generation.
    ///
    /// Cancellation is honoured up to the commit. On any error the old
    /// layout is untouched and still authoritative.
    ///
    /// # Errors
    /// - `Cancelled` if `cancel` fires before the commit
    /// - Any gather error of the current generation
    #[allow(clippy::too_many_arguments)]
    pub async fn stage_rescatter(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        record: &FileRecord,
        temporal_salt: u64,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
        cancel: &CancellationToken,
    ) -> Result<GenerationSwitch> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let keys = self.keyring(key);
        let projector = AddressProjector::new(medium.size())?;
        let recovery = self
            .recover(&keys, file_id, record, &projector, medium)
            .await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let complete = recovery.layout.is_complete();
        let current = recovery.layout;
        let plaintext = self.decode(file_id, record, recovery.shards)?;
        let retired = if complete {
            current
        } else {
            self.full_layout(&keys, file_id, record, &plaintext, &projector)?
        };

        let (record, placed) = self
            .commit_generation(
                &keys,
                file_id,
                record.next_generation(temporal_salt),
                &plaintext,
                Some(&retired),
                occupied,
                Some(cancel),
                medium,
            )
            .await?;
        Ok(GenerationSwitch {
            record,
            placed,
            retired,
        })
    }

    /// Commit new content for an existing file into its next generation.
    ///
    /// The previous content stays readable under `previous` until the
    /// returned layout is retired.
    #[allow(clippy::too_many_arguments)]
    pub async fn stage_rewrite(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        previous: &FileRecord,
        plaintext: &[u8],
        group: ShardGroup,
        temporal_salt: u64,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
    ) -> Result<GenerationSwitch> {
        group.validate()?;
        let keys = self.keyring(key);
        let projector = AddressProjector::new(medium.size())?;
        let retired = match self
            .locate(&keys, file_id, previous, &projector, medium)
            .await
        {
            Ok(layout) => layout,
            Err(Error::CorruptedLayout(_)) => {
                warn!(file_id = %file_id, "Previous content unreadable; its cells stay in place");
                ScatterLayout {
                    generation: previous.generation,
                    shards: Vec::new(),
                }
            }
            Err(e) => return Err(e),
        };

        let record = FileRecord {
            created_at: previous.created_at,
            ..FileRecord::new(
                plaintext.len(),
                group,
                previous.generation + 1,
                temporal_salt,
            )
        };
        let (record, placed) = self
            .commit_generation(
                &keys,
                file_id,
                record,
                plaintext,
                Some(&retired),
                occupied,
                None,
                medium,
            )
            .await?;
        Ok(GenerationSwitch {
            record,
            placed,
            retired,
        })
    }

    /// Phase 2: restore a superseded layout to background filler.
    ///
    /// Cells in `occupied` are left as they are.
    pub async fn retire(
        &self,
        key: &MasterKey,
        layout: &ScatterLayout,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
    ) -> Result<()> {
        let keys = self.keyring(key);
        self.wipe(&keys, layout, occupied, medium).await
    }

    /// Both rescatter phases, for callers that keep the record themselves.
    #[allow(clippy::too_many_arguments)]
    pub async fn rescatter(
        &self,
        key: &MasterKey,
        file_id: &FileId,
        record: &FileRecord,
        temporal_salt: u64,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        let switch = self
            .stage_rescatter(key, file_id, record, temporal_salt, occupied, medium, cancel)
            .await?;
        self.retire(key, &switch.retired, occupied, medium).await?;
        Ok(switch.record)
    }

    fn check_capacity(&self, projector: &AddressProjector, record: &FileRecord) -> Result<()> {
        let slots = projector.lane_slots(record.lanes());
        let budget = slots as f64 * self.config.max_lane_load;
        if slots == 0 || record.stream_len() as f64 > budget {
            return Err(Error::InvalidInput(format!(
                "File of {} bytes does not fit the medium",
                record.plaintext_len
            )));
        }
        Ok(())
    }

    /// A record whose streams overflow their lanes was not written to this
    /// medium.
    fn check_geometry(&self, projector: &AddressProjector, record: &FileRecord) -> Result<()> {
        record.group.validate()?;
        let slots = projector.lane_slots(record.lanes());
        if slots == 0 || record.stream_len() > slots {
            return Err(Error::CorruptedLayout(format!(
                "Record of {} bytes does not fit a medium of {} cells",
                record.plaintext_len,
                projector.medium_size()
            )));
        }
        Ok(())
    }

    /// Place, stage and commit one generation.
    ///
    /// Returns `record` with the displacements of the new placement.
    #[allow(clippy::too_many_arguments)]
    async fn commit_generation(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        mut record: FileRecord,
        plaintext: &[u8],
        preserve: Option<&ScatterLayout>,
        occupied: &Occupancy,
        cancel: Option<&CancellationToken>,
        medium: &dyn StorageMedium,
    ) -> Result<(FileRecord, ScatterLayout)> {
        let projector = AddressProjector::new(medium.size())?;
        self.check_capacity(&projector, &record)?;
        let staged = self.stage_write(
            keys, file_id, &record, plaintext, &projector, preserve, occupied,
        )?;

        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(Error::Cancelled);
        }
        let batch = staged.batch.seal();
        medium.apply(&batch).await?;

        record.displaced = staged.displaced;
        debug!(
            file_id = %file_id,
            generation = record.generation,
            real = staged.layout.real_cells(),
            displaced = record.displaced.len(),
            decoys = staged.decoys,
            "Committed scatter batch"
        );
        Ok((record, staged.layout))
    }

    /// Place every unit of every shard stream, calling `visit` per unit.
    ///
    /// With `occupied` set the placement is new and keeps clear of it;
    /// otherwise the placement recorded in `record` is replayed.
    #[allow(clippy::too_many_arguments)]
    fn place_streams<F>(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        plaintext: &[u8],
        projector: &AddressProjector,
        occupied: Option<&Occupancy>,
        mut visit: F,
    ) -> Result<(ScatterLayout, Vec<Displacement>)>
    where
        F: FnMut(u64, u64, u8, &Placement),
    {
        let shards = RedundancyCodec::new(record.group)?.encode(plaintext)?;
        let mut layouts = Vec::with_capacity(shards.len());
        let mut displaced = Vec::new();
        for (index, shard) in shards.iter().enumerate() {
            let stream = seal_shard(index as u16, shard);
            let prefix = &stream[..stream.len().min(SEMANTIC_BOOTSTRAP_UNITS as usize)];
            let scope = UnitScope {
                file_id,
                shard: index as u16,
                temporal_salt: record.temporal_salt,
            };
            let generator = CoordinateGenerator::new(&keys.axes, &scope)
                .with_bootstrap(&bootstrap_digest(prefix));
            let tag = generator.stream_tag();

            let mut placer = match occupied {
                Some(occupied) => ShardPlacer::fresh(projector, record, index, occupied),
                None => ShardPlacer::replay(projector, record, index),
            };
            let mut addresses = Vec::with_capacity(stream.len());
            for (unit, value) in stream.iter().enumerate() {
                let placement = placer
                    .place(&generator, unit as u64)
                    .ok_or_else(|| placer.exhausted(file_id))?;
                visit(tag, unit as u64, *value, &placement);
                addresses.push(placement.address);
            }
            displaced.append(&mut placer.displaced);
            layouts.push(ShardLayout {
                addresses,
                complete: true,
            });
        }
        let layout = ScatterLayout {
            generation: record.generation,
            shards: layouts,
        };
        Ok((layout, displaced))
    }

    fn full_layout(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        plaintext: &[u8],
        projector: &AddressProjector,
    ) -> Result<ScatterLayout> {
        let (layout, _) =
            self.place_streams(keys, file_id, record, plaintext, projector, None, |_, _, _, _| {})?;
        Ok(layout)
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_write(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        plaintext: &[u8],
        projector: &AddressProjector,
        preserve: Option<&ScatterLayout>,
        occupied: &Occupancy,
    ) -> Result<StagedWrite> {
        let mut batch = WriteBatch::with_capacity(
            record.stream_len() as usize * record.group.total() * 2,
        );
        let mut decoy_cells = Vec::new();
        let max_decoys = self.config.max_decoys;

        let (layout, displaced) = self.place_streams(
            keys,
            file_id,
            record,
            plaintext,
            projector,
            Some(occupied),
            |tag, unit, value, placement| {
                let stored = keys
                    .mixer
                    .write_unit(value, placement.address, placement.context);
                batch.put(placement.address, stored);

                let count = keys.mixer.decoy_count(tag, unit, max_decoys);
                decoy_cells.extend(
                    placement
                        .candidates
                        .decoys(placement.selector, count)
                        .map(|c| projector.project(&c)),
                );
            },
        )?;

        let real = layout.address_set();
        let preserved = preserve.map(|l| l.address_set()).unwrap_or_default();
        let mut decoys = 0;
        for address in decoy_cells {
            if !real.contains(&address) && !preserved.contains(&address) {
                batch.touch(address);
                decoys += 1;
            }
        }
        Ok(StagedWrite {
            batch,
            layout,
            displaced,
            decoys,
        })
    }

    /// Cells of one shard stream in unit order, and the bootstrap prefix
    /// units read from the first of them.
    async fn trace_shard(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        shard: usize,
        projector: &AddressProjector,
        medium: &dyn StorageMedium,
    ) -> Result<(Vec<(PhysicalAddress, u64)>, Vec<u8>)> {
        let stream_len = record.stream_len();
        let prefix_len = stream_len.min(SEMANTIC_BOOTSTRAP_UNITS);
        let scope = UnitScope {
            file_id,
            shard: shard as u16,
            temporal_salt: record.temporal_salt,
        };
        let generator = CoordinateGenerator::new(&keys.axes, &scope);
        let mut placer = ShardPlacer::replay(projector, record, shard);
        let mut cells = Vec::with_capacity(stream_len as usize);

        for unit in 0..prefix_len {
            let p = placer
                .place(&generator, unit)
                .ok_or_else(|| placer.exhausted(file_id))?;
            cells.push((p.address, p.context));
        }
        let prefix = self.read_units(keys, &cells, medium).await?;

        let generator = generator.with_bootstrap(&bootstrap_digest(&prefix));
        for unit in prefix_len..stream_len {
            let p = placer
                .place(&generator, unit)
                .ok_or_else(|| placer.exhausted(file_id))?;
            cells.push((p.address, p.context));
        }
        Ok((cells, prefix))
    }

    /// Read back every shard stream of a file.
    async fn recover(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        projector: &AddressProjector,
        medium: &dyn StorageMedium,
    ) -> Result<Recovery> {
        self.check_geometry(projector, record)?;
        let total = record.group.total();

        let mut shards = Vec::with_capacity(total);
        let mut layouts = Vec::with_capacity(total);
        for index in 0..total {
            let (cells, mut stream) = self
                .trace_shard(keys, file_id, record, index, projector, medium)
                .await?;
            let prefix_len = stream.len();
            stream.extend(self.read_units(keys, &cells[prefix_len..], medium).await?);

            let mut addresses: Vec<PhysicalAddress> = cells.iter().map(|(a, _)| *a).collect();
            match open_shard(index as u16, &stream) {
                Some(shard) => {
                    shards.push(Some(shard.to_vec()));
                    layouts.push(ShardLayout {
                        addresses,
                        complete: true,
                    });
                }
                None => {
                    addresses.truncate(prefix_len);
                    shards.push(None);
                    layouts.push(ShardLayout {
                        addresses,
                        complete: false,
                    });
                }
            }
        }

        Ok(Recovery {
            shards,
            layout: ScatterLayout {
                generation: record.generation,
                shards: layouts,
            },
        })
    }

    /// Real cells of a file as placed, without verifying its shards.
    async fn footprint(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        projector: &AddressProjector,
        medium: &dyn StorageMedium,
    ) -> Result<Vec<PhysicalAddress>> {
        self.check_geometry(projector, record)?;
        let mut addresses = Vec::new();
        for index in 0..record.group.total() {
            let (cells, _) = self
                .trace_shard(keys, file_id, record, index, projector, medium)
                .await?;
            addresses.extend(cells.into_iter().map(|(address, _)| address));
        }
        Ok(addresses)
    }

    async fn read_units(
        &self,
        keys: &Keyring,
        cells: &[(PhysicalAddress, u64)],
        medium: &dyn StorageMedium,
    ) -> Result<Vec<u8>> {
        let addresses: Vec<PhysicalAddress> = cells.iter().map(|(a, _)| *a).collect();
        let stored = medium.read_cells(&addresses).await?;
        Ok(stored
            .iter()
            .zip(cells)
            .map(|(value, (address, context))| keys.mixer.read_unit(*value, *address, *context))
            .collect())
    }

    fn decode(
        &self,
        file_id: &FileId,
        record: &FileRecord,
        shards: Vec<Option<Vec<u8>>>,
    ) -> Result<Vec<u8>> {
        let intact = shards.iter().filter(|s| s.is_some()).count();
        if intact == 0 {
            return Err(Error::CorruptedLayout(
                "No shard of the file verified".to_string(),
            ));
        }
        if intact < shards.len() {
            warn!(
                file_id = %file_id,
                damaged = shards.len() - intact,
                "Damaged shards; decoding from redundancy"
            );
        }
        RedundancyCodec::new(record.group)?.decode(shards, record.plaintext_len as usize)
    }

    /// Best available layout of the current generation.
    async fn locate(
        &self,
        keys: &Keyring,
        file_id: &FileId,
        record: &FileRecord,
        projector: &AddressProjector,
        medium: &dyn StorageMedium,
    ) -> Result<ScatterLayout> {
        let recovery = self
            .recover(keys, file_id, record, projector, medium)
            .await?;
        if recovery.layout.is_complete() {
            return Ok(recovery.layout);
        }
        if recovery.intact() == 0 {
            return Err(Error::CorruptedLayout(
                "No shard of the file verified".to_string(),
            ));
        }

        let partial = recovery.layout;
        match self.decode(file_id, record, recovery.shards) {
            Ok(plaintext) => self.full_layout(keys, file_id, record, &plaintext, projector),
            Err(e) => {
                warn!(
                    file_id = %file_id,
                    error = %e,
                    "File not recoverable; only verified cells are located"
                );
                Ok(partial)
            }
        }
    }

    async fn wipe(
        &self,
        keys: &Keyring,
        layout: &ScatterLayout,
        occupied: &Occupancy,
        medium: &dyn StorageMedium,
    ) -> Result<()> {
        let mut batch = WriteBatch::with_capacity(layout.real_cells());
        let mut spared = 0usize;
        for address in layout.addresses() {
            if occupied.contains(address) {
                spared += 1;
                continue;
            }
            batch.put(address, keys.mixer.filler(address, 0));
        }
        if spared > 0 {
            warn!(cells = spared, "Left cells held by other files in place");
        }
        medium.apply(&batch.seal()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimvault_crypto::MASTER_KEY_LENGTH;
    use dimvault_storage::MemoryMedium;

    const MEDIUM_SIZE: usize = 1 << 20;

    fn master_key(seed: u8) -> MasterKey {
        MasterKey::from_bytes([seed; MASTER_KEY_LENGTH])
    }

    fn file(id: &str) -> FileId {
        FileId::new(id).unwrap()
    }

    fn data(len: usize, seed: u64) -> Vec<u8> {
        (0..len as u64)
            .map(|i| (dimvault_crypto::fmix64(i ^ (seed << 32)) >> 56) as u8)
            .collect()
    }

    async fn formatted(key: &MasterKey) -> (ScatterEngine, MemoryMedium) {
        let engine = ScatterEngine::default();
        let medium = MemoryMedium::new(MEDIUM_SIZE);
        engine.format(key, &medium).await.unwrap();
        (engine, medium)
    }

    async fn flip_shard(medium: &MemoryMedium, layout: &ScatterLayout, shard: usize) {
        for &address in layout.shards()[shard].addresses() {
            let value = medium.read(address, 1).await.unwrap()[0];
            medium.write(address, &[value ^ 0xff]).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_roundtrip_sizes_and_groups() {
        let key = master_key(1);
        let (engine, medium) = formatted(&key).await;
        let groups = [
            ShardGroup::default(),
            ShardGroup::new(3, 0).unwrap(),
            ShardGroup::new(1, 0).unwrap(),
            ShardGroup::new(5, 3).unwrap(),
        ];
        for (i, group) in groups.into_iter().enumerate() {
            for len in [0usize, 1, 31, 1000, 20_000] {
                let id = file(&format!("file-{}-{}", i, len));
                let plaintext = data(len, i as u64);
                let record = engine
                    .scatter(&key, &id, &plaintext, group, 5, &Occupancy::new(), &medium)
                    .await
                    .unwrap();
                let gathered = engine.gather(&key, &id, &record, &medium).await.unwrap();
                assert_eq!(gathered, plaintext);
                engine.delete(&key, &id, &record, &Occupancy::new(), &medium).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_key_is_corrupted_layout() {
        let key = master_key(1);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let record = engine
            .scatter(&key, &id, &data(500, 1), ShardGroup::default(), 0, &Occupancy::new(), &medium)
            .await
            .unwrap();

        let result = engine.gather(&master_key(2), &id, &record, &medium).await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));

        let other_file = engine.gather(&key, &file("f2"), &record, &medium).await;
        assert!(matches!(other_file, Err(Error::CorruptedLayout(_))));
    }

    #[tokio::test]
    async fn test_layout_is_deterministic_and_key_dependent() {
        let key1 = master_key(1);
        let key2 = master_key(2);
        let engine = ScatterEngine::default();
        let medium1 = MemoryMedium::new(MEDIUM_SIZE);
        let medium2 = MemoryMedium::new(MEDIUM_SIZE);
        let id = file("f1");
        let plaintext = data(4000, 3);

        let record = engine
            .scatter(&key1, &id, &plaintext, ShardGroup::default(), 9, &Occupancy::new(), &medium1)
            .await
            .unwrap();
        let record2 = engine
            .scatter(&key2, &id, &plaintext, ShardGroup::default(), 9, &Occupancy::new(), &medium2)
            .await
            .unwrap();

        let a = engine.layout(&key1, &id, &record, &medium1).await.unwrap();
        let again = engine.layout(&key1, &id, &record, &medium1).await.unwrap();
        let b = engine.layout(&key2, &id, &record2, &medium2).await.unwrap();

        let a_cells: Vec<_> = a.addresses().collect();
        let again_cells: Vec<_> = again.addresses().collect();
        assert_eq!(a_cells, again_cells);

        let shared = a.address_set().intersection(&b.address_set()).count();
        assert!(shared < a.real_cells() / 20, "{} shared cells", shared);
    }

    #[tokio::test]
    async fn test_untouched_cells_hold_filler() {
        let key = master_key(4);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let record = engine
            .scatter(
                &key,
                &id,
                &data(10_000, 4),
                ShardGroup::default(),
                0,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();

        let real = engine
            .layout(&key, &id, &record, &medium)
            .await
            .unwrap()
            .address_set();
        let mixer = EntropicMixer::new(&key.axis_keys(), DensityBand::default());
        let snapshot = medium.snapshot().unwrap();
        for (address, value) in snapshot.iter().enumerate() {
            if !real.contains(&(address as u64)) {
                assert_eq!(*value, mixer.filler(address as u64, 0));
            }
        }
    }

    #[tokio::test]
    async fn test_redundancy_tolerance() {
        let key = master_key(5);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let plaintext = data(6000, 5);
        let record = engine
            .scatter(&key, &id, &plaintext, ShardGroup::default(), 0, &Occupancy::new(), &medium)
            .await
            .unwrap();
        let layout = engine.layout(&key, &id, &record, &medium).await.unwrap();

        flip_shard(&medium, &layout, 1).await;
        flip_shard(&medium, &layout, 4).await;
        let gathered = engine.gather(&key, &id, &record, &medium).await.unwrap();
        assert_eq!(gathered, plaintext);

        flip_shard(&medium, &layout, 0).await;
        let result = engine.gather(&key, &id, &record, &medium).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientShards {
                available: 3,
                required: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_delete_restores_background() {
        let key = master_key(6);
        let (engine, medium) = formatted(&key).await;
        let background = medium.snapshot().unwrap();

        let id = file("f1");
        let record = engine
            .scatter(
                &key,
                &id,
                &data(8000, 6),
                ShardGroup::default(),
                0,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();
        assert_ne!(medium.snapshot().unwrap(), background);

        engine.delete(&key, &id, &record, &Occupancy::new(), &medium).await.unwrap();
        assert_eq!(medium.snapshot().unwrap(), background);
    }

    #[tokio::test]
    async fn test_delete_damaged_but_recoverable_file() {
        let key = master_key(7);
        let (engine, medium) = formatted(&key).await;
        let background = medium.snapshot().unwrap();

        let id = file("f1");
        let record = engine
            .scatter(
                &key,
                &id,
                &data(3000, 7),
                ShardGroup::default(),
                0,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();
        let layout = engine.layout(&key, &id, &record, &medium).await.unwrap();
        flip_shard(&medium, &layout, 2).await;

        engine.delete(&key, &id, &record, &Occupancy::new(), &medium).await.unwrap();
        assert_eq!(medium.snapshot().unwrap(), background);
    }

    #[tokio::test]
    async fn test_delete_with_wrong_key_writes_nothing() {
        let key = master_key(8);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let record = engine
            .scatter(&key, &id, &data(300, 8), ShardGroup::default(), 0, &Occupancy::new(), &medium)
            .await
            .unwrap();
        let before = medium.snapshot().unwrap();

        let result = engine
            .delete(&master_key(9), &id, &record, &Occupancy::new(), &medium)
            .await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));
        assert_eq!(medium.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn test_rescatter_moves_every_cell() {
        let key = master_key(10);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let plaintext = data(5000, 10);
        let record = engine
            .scatter(&key, &id, &plaintext, ShardGroup::default(), 1, &Occupancy::new(), &medium)
            .await
            .unwrap();
        let before = engine.layout(&key, &id, &record, &medium).await.unwrap();

        let next = engine
            .rescatter(&key, &id, &record, 2, &Occupancy::new(), &medium, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(next.generation, 1);
        assert_eq!(next.temporal_salt, 2);

        let after = engine.layout(&key, &id, &next, &medium).await.unwrap();
        assert!(before.address_set().is_disjoint(&after.address_set()));
        assert_eq!(
            engine.gather(&key, &id, &next, &medium).await.unwrap(),
            plaintext
        );

        let stale = engine.gather(&key, &id, &record, &medium).await;
        assert!(matches!(stale, Err(Error::CorruptedLayout(_))));
    }

    #[tokio::test]
    async fn test_cancelled_rescatter_leaves_medium_untouched() {
        let key = master_key(11);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let plaintext = data(2000, 11);
        let record = engine
            .scatter(&key, &id, &plaintext, ShardGroup::default(), 1, &Occupancy::new(), &medium)
            .await
            .unwrap();
        let before = medium.snapshot().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine
            .stage_rescatter(&key, &id, &record, 2, &Occupancy::new(), &medium, &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(medium.snapshot().unwrap(), before);
        assert_eq!(
            engine.gather(&key, &id, &record, &medium).await.unwrap(),
            plaintext
        );
    }

    #[tokio::test]
    async fn test_rewrite_switches_generation() {
        let key = master_key(12);
        let (engine, medium) = formatted(&key).await;
        let background = medium.snapshot().unwrap();
        let id = file("f1");
        let record = engine
            .scatter(
                &key,
                &id,
                &data(4000, 12),
                ShardGroup::default(),
                1,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();

        let replacement = data(900, 13);
        let switch = engine
            .stage_rewrite(
                &key,
                &id,
                &record,
                &replacement,
                ShardGroup::new(2, 1).unwrap(),
                3,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();
        assert!(switch
            .placed
            .address_set()
            .is_disjoint(&switch.retired.address_set()));

        // both generations readable until the old one is retired
        assert_eq!(
            engine.gather(&key, &id, &record, &medium).await.unwrap(),
            data(4000, 12)
        );
        engine.retire(&key, &switch.retired, &Occupancy::new(), &medium).await.unwrap();
        assert_eq!(
            engine.gather(&key, &id, &switch.record, &medium).await.unwrap(),
            replacement
        );

        engine.delete(&key, &id, &switch.record, &Occupancy::new(), &medium).await.unwrap();
        assert_eq!(medium.snapshot().unwrap(), background);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_before_writing() {
        let key = master_key(13);
        let engine = ScatterEngine::default();
        let medium = MemoryMedium::new(4096);
        engine.format(&key, &medium).await.unwrap();
        let before = medium.snapshot().unwrap();

        let result = engine
            .scatter(
                &key,
                &file("big"),
                &data(2000, 0),
                ShardGroup::default(),
                0,
                &Occupancy::new(),
                &medium,
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(medium.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn test_files_coexist() {
        let key = master_key(14);
        let engine = ScatterEngine::default();
        let medium = MemoryMedium::new(16 << 20);
        engine.format(&key, &medium).await.unwrap();

        let mut records = BTreeMap::new();
        for i in 0..4 {
            let id = file(&format!("doc-{}", i));
            let occupied = engine.occupancy(&key, &records, &medium).await.unwrap();
            let record = engine
                .scatter(&key, &id, &data(200, i), ShardGroup::default(), i, &occupied, &medium)
                .await
                .unwrap();
            records.insert(id, record);
        }
        for (i, (id, record)) in records.iter().enumerate() {
            let gathered = engine.gather(&key, id, record, &medium).await.unwrap();
            assert_eq!(gathered, data(200, i as u64));
        }
    }

    #[tokio::test]
    async fn test_large_files_never_share_cells() {
        let key = master_key(15);
        let engine = ScatterEngine::default();
        let medium = MemoryMedium::new(16 << 20);
        engine.format(&key, &medium).await.unwrap();
        let background = medium.snapshot().unwrap();
        let (a, b) = (file("a.bin"), file("b.bin"));
        let (a_data, b_data) = (data(64 << 10, 1), data(64 << 10, 2));

        let a_record = engine
            .scatter(&key, &a, &a_data, ShardGroup::default(), 1, &Occupancy::new(), &medium)
            .await
            .unwrap();
        let mut live = BTreeMap::from([(a.clone(), a_record.clone())]);
        let occupied = engine.occupancy(&key, &live, &medium).await.unwrap();
        assert_eq!(occupied.len(), a_record.stream_len() as usize * 6);

        let b_record = engine
            .scatter(&key, &b, &b_data, ShardGroup::default(), 2, &occupied, &medium)
            .await
            .unwrap();
        // streams of this size cannot avoid each other's first choices
        assert!(!b_record.displaced.is_empty());

        let a_cells = engine.layout(&key, &a, &a_record, &medium).await.unwrap();
        let b_cells = engine.layout(&key, &b, &b_record, &medium).await.unwrap();
        assert!(a_cells.address_set().is_disjoint(&b_cells.address_set()));
        assert_eq!(engine.gather(&key, &a, &a_record, &medium).await.unwrap(), a_data);
        assert_eq!(engine.gather(&key, &b, &b_record, &medium).await.unwrap(), b_data);

        live.remove(&a);
        live.insert(b.clone(), b_record.clone());
        let others = engine.occupancy(&key, &live, &medium).await.unwrap();
        engine.delete(&key, &a, &a_record, &others, &medium).await.unwrap();
        assert_eq!(engine.gather(&key, &b, &b_record, &medium).await.unwrap(), b_data);

        engine
            .delete(&key, &b, &b_record, &Occupancy::new(), &medium)
            .await
            .unwrap();
        assert_eq!(medium.snapshot().unwrap(), background);
    }

    #[tokio::test]
    async fn test_rescatter_keeps_clear_of_other_files() {
        let key = master_key(16);
        let engine = ScatterEngine::default();
        let medium = MemoryMedium::new(4 << 20);
        engine.format(&key, &medium).await.unwrap();
        let (a, b) = (file("a"), file("b"));
        let (a_data, b_data) = (data(30_000, 3), data(30_000, 4));

        let a_record = engine
            .scatter(&key, &a, &a_data, ShardGroup::default(), 1, &Occupancy::new(), &medium)
            .await
            .unwrap();
        let only_a = BTreeMap::from([(a.clone(), a_record.clone())]);
        let occupied = engine.occupancy(&key, &only_a, &medium).await.unwrap();
        let b_record = engine
            .scatter(&key, &b, &b_data, ShardGroup::default(), 2, &occupied, &medium)
            .await
            .unwrap();
        let b_record = engine
            .rescatter(&key, &b, &b_record, 3, &occupied, &medium, &CancellationToken::new())
            .await
            .unwrap();

        // both now live in the odd lanes
        let only_b = BTreeMap::from([(b.clone(), b_record.clone())]);
        let occupied = engine.occupancy(&key, &only_b, &medium).await.unwrap();
        let next = engine
            .rescatter(&key, &a, &a_record, 9, &occupied, &medium, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!next.displaced.is_empty());
        let a_cells = engine.layout(&key, &a, &next, &medium).await.unwrap();
        let b_cells = engine.layout(&key, &b, &b_record, &medium).await.unwrap();
        assert!(a_cells.address_set().is_disjoint(&b_cells.address_set()));

        assert_eq!(engine.gather(&key, &a, &next, &medium).await.unwrap(), a_data);
        assert_eq!(engine.gather(&key, &b, &b_record, &medium).await.unwrap(), b_data);
    }

    #[tokio::test]
    async fn test_retire_spares_occupied_cells() {
        let key = master_key(17);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let record = engine
            .scatter(
                &key,
                &id,
                &data(2000, 17),
                ShardGroup::default(),
                0,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();
        let layout = engine.layout(&key, &id, &record, &medium).await.unwrap();
        let held: Vec<PhysicalAddress> = layout.addresses().take(10).collect();
        let mut occupied = Occupancy::new();
        occupied.extend(held.iter().copied());
        let before = medium.read_cells(&held).await.unwrap();

        engine.retire(&key, &layout, &occupied, &medium).await.unwrap();
        assert_eq!(medium.read_cells(&held).await.unwrap(), before);

        let mixer = EntropicMixer::new(&key.axis_keys(), DensityBand::default());
        for address in layout.addresses().skip(10) {
            let value = medium.read(address, 1).await.unwrap()[0];
            assert_eq!(value, mixer.filler(address, 0));
        }
    }

    #[tokio::test]
    async fn test_full_lanes_reject_new_file() {
        let key = master_key(18);
        let engine = ScatterEngine::default();
        let medium = MemoryMedium::new(12 * 64);
        engine.format(&key, &medium).await.unwrap();
        let before = medium.snapshot().unwrap();

        // every cell of the medium is held by some other file
        let mut occupied = Occupancy::new();
        occupied.extend(0..12 * 64);
        let result = engine
            .scatter(&key, &file("f"), &data(40, 1), ShardGroup::default(), 0, &occupied, &medium)
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(medium.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn test_record_larger_than_medium_is_corrupted() {
        let key = master_key(19);
        let engine = ScatterEngine::default();
        let id = file("f1");

        // fewer cells than lanes
        let tiny = MemoryMedium::new(8);
        let record = FileRecord::new(10, ShardGroup::default(), 0, 0);
        let result = engine.gather(&key, &id, &record, &tiny).await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));
        let result = engine.layout(&key, &id, &record, &tiny).await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));

        // streams longer than their lanes
        let small = MemoryMedium::new(4096);
        let record = FileRecord::new(2000, ShardGroup::default(), 0, 0);
        let result = engine.gather(&key, &id, &record, &small).await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));
        let result = engine
            .delete(&key, &id, &record, &Occupancy::new(), &small)
            .await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));
        let result = engine
            .stage_rescatter(
                &key,
                &id,
                &record,
                1,
                &Occupancy::new(),
                &small,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));

        let occupancy = engine
            .occupancy(&key, &BTreeMap::from([(id, record)]), &small)
            .await
            .unwrap();
        assert!(occupancy.is_empty());
    }

    #[tokio::test]
    async fn test_forged_skip_is_corrupted() {
        let key = master_key(20);
        let (engine, medium) = formatted(&key).await;
        let id = file("f1");
        let mut record = engine
            .scatter(
                &key,
                &id,
                &data(100, 20),
                ShardGroup::default(),
                0,
                &Occupancy::new(),
                &medium,
            )
            .await
            .unwrap();
        record.displaced.push(Displacement {
            shard: 0,
            unit: 0,
            skip: u32::MAX,
        });
        let result = engine.gather(&key, &id, &record, &medium).await;
        assert!(matches!(result, Err(Error::CorruptedLayout(_))));
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        let config = EngineConfig::default().with_max_lane_load(1.0);
        assert!(ScatterEngine::new(config).is_err());

        let config = EngineConfig::default()
            .with_max_decoys(0)
            .with_max_lane_load(0.25);
        assert!(ScatterEngine::new(config).is_ok());
    }
}
