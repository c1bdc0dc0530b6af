//! Server and protocol catalog.
//!
//! Holds the current endpoint snapshot in display order and maps list rows to
//! stable endpoint ids. Row 0 of each list is a placeholder, so row `i`
//! (`i >= 1`) is endpoint `i - 1`. Row numbers are never used as identity:
//! they change with every repopulation.
//!
//! Refilling a list fires selection events in most toolkits. While a
//! repopulation is running the catalog reports itself busy and selection
//! calls are ignored, so views share one guard instead of keeping their own.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, Flag, Settings};
use crate::constants;
use crate::core::inventory::Inventory;
use crate::error::{Error, Result};
use crate::state::{EncryptionMode, Endpoint, EndpointId, ProtocolOption, Selection, Target};

/// Immutable endpoint list produced by one repopulation.
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    endpoints: Vec<Endpoint>,
}

impl Snapshot {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Endpoints in display order.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    #[must_use]
    pub fn get(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn ids(&self) -> BTreeSet<EndpointId> {
        self.endpoints.iter().map(|e| e.id).collect()
    }

    /// Resolve a selection into a connectable target.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSelection`] if either half is missing or stale, or the
    /// endpoint cannot serve the protocol under the configured encryption.
    pub fn resolve(&self, selection: Selection, config: &ConnectionConfig) -> Result<Target> {
        let (Some(id), Some(protocol)) = (selection.endpoint, selection.protocol) else {
            return Err(Error::InvalidSelection);
        };
        let endpoint = self.get(id).ok_or(Error::InvalidSelection)?;
        let option = config
            .encryption
            .protocols()
            .get(protocol)
            .copied()
            .ok_or(Error::InvalidSelection)?;
        if !endpoint.supports(option, config.encryption) {
            return Err(Error::InvalidSelection);
        }
        Ok(Target {
            endpoint: endpoint.clone(),
            protocol,
            option,
        })
    }

    /// The first eligible endpoint after `current` in display order, wrapping
    /// around, skipping `current` itself and any id for which `skip` holds.
    /// If `current` is no longer listed the search starts at the top.
    pub fn next_after(
        &self,
        current: EndpointId,
        option: ProtocolOption,
        mode: EncryptionMode,
        skip: impl Fn(EndpointId) -> bool,
    ) -> Option<&Endpoint> {
        let len = self.endpoints.len();
        let start = self
            .endpoints
            .iter()
            .position(|e| e.id == current)
            .map_or(0, |i| i + 1);
        (0..len)
            .map(|k| &self.endpoints[(start + k) % len])
            .filter(|e| e.id != current)
            .find(|e| e.supports(option, mode) && !skip(e.id))
    }
}

/// Held while a repopulation runs.
pub struct BusyGuard<'a> {
    busy: &'a AtomicUsize,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Inner {
    inventory: Box<dyn Inventory>,
    settings: Settings,
    snapshot: RwLock<Arc<Snapshot>>,
    busy: AtomicUsize,
    generation: AtomicU64,
}

/// Shared handle to the catalog. Cheap to clone.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

impl Catalog {
    /// An empty catalog; call [`Catalog::repopulate`] to fill it.
    pub fn new(inventory: impl Inventory + 'static, settings: Settings) -> Self {
        Self {
            inner: Arc::new(Inner {
                inventory: Box::new(inventory),
                settings,
                snapshot: RwLock::new(Arc::new(Snapshot::default())),
                busy: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot. Stays valid even if the catalog is repopulated meanwhile.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a repopulation is running. Selection handlers must return early when set.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst) > 0
    }

    /// Number of completed repopulations.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_update(&self) -> BusyGuard<'_> {
        self.inner.busy.fetch_add(1, Ordering::SeqCst);
        BusyGuard {
            busy: &self.inner.busy,
        }
    }

    /// Fetch the inventory and replace the snapshot.
    ///
    /// With `random` the display order is shuffled; otherwise endpoints are
    /// ranked by ping, unmeasured ones last. Individual nodes are hidden
    /// unless `show-nodes` is set, and obfuscation modes only list servers
    /// that support it. May block on the network.
    ///
    /// # Errors
    ///
    /// [`Error::FetchFailed`]; the previous snapshot stays in place.
    pub fn repopulate(&self, random: bool) -> Result<()> {
        let _guard = self.begin_update();

        let fetched = self.inner.inventory.fetch().inspect_err(|e| {
            warn!(error = %e, "catalog refresh failed, keeping previous list");
        })?;

        let show_nodes = self
            .inner
            .settings
            .flag(Flag::ShowNodes)
            .unwrap_or_default();
        let encryption = self.inner.settings.encryption().unwrap_or_default();

        let mut seen = HashSet::new();
        let mut endpoints: Vec<Endpoint> = fetched
            .into_iter()
            .filter(|e| seen.insert(e.id))
            .filter(|e| show_nodes || e.hub)
            .filter(|e| !encryption.is_obfuscated() || e.obfuscation)
            .collect();

        if random {
            endpoints.shuffle(&mut rand::rng());
        } else {
            endpoints.sort_by_key(|e| (e.ping_ms.is_none(), e.ping_ms, e.id));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            generation,
            count = endpoints.len(),
            random,
            "catalog repopulated"
        );
        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(Snapshot {
            generation,
            endpoints,
        });
        Ok(())
    }

    /// Location list: placeholder, then one label per endpoint.
    #[must_use]
    pub fn rows(&self) -> Vec<String> {
        std::iter::once(constants::LOCATION_PLACEHOLDER.to_string())
            .chain(self.snapshot().endpoints().iter().map(Endpoint::label))
            .collect()
    }

    /// Endpoint id shown at `row`; `None` for the placeholder or past the end.
    #[must_use]
    pub fn endpoint_at_row(&self, row: usize) -> Option<EndpointId> {
        let index = row.checked_sub(1)?;
        self.snapshot().endpoints().get(index).map(|e| e.id)
    }

    /// Handle a location pick. Records and returns the endpoint id.
    ///
    /// Returns `None` without recording anything while a repopulation is running.
    pub fn select_endpoint(&self, row: usize) -> Option<EndpointId> {
        if self.is_busy() {
            debug!(row, "location change ignored during repopulation");
            return None;
        }
        let id = self.endpoint_at_row(row);
        self.record(Selection {
            endpoint: id,
            protocol: self.current_protocol_index(),
        });
        id
    }

    /// Protocol list for the configured encryption mode.
    #[must_use]
    pub fn protocol_rows(&self) -> Vec<String> {
        std::iter::once(constants::PROTOCOL_PLACEHOLDER.to_string())
            .chain(self.protocol_options().iter().map(ToString::to_string))
            .collect()
    }

    /// Handle a protocol pick. Same busy rule as [`Catalog::select_endpoint`].
    pub fn select_protocol(&self, row: usize) -> Option<usize> {
        if self.is_busy() {
            debug!(row, "protocol change ignored during repopulation");
            return None;
        }
        let index = row
            .checked_sub(1)
            .filter(|i| *i < self.protocol_options().len());
        self.record(Selection {
            endpoint: self.current_endpoint(),
            protocol: index,
        });
        index
    }

    /// Index into the protocol options, or `None` when unselected.
    #[must_use]
    pub fn current_protocol_index(&self) -> Option<usize> {
        self.inner
            .settings
            .selection()
            .protocol
            .filter(|i| *i < self.protocol_options().len())
    }

    /// Selected endpoint, or `None` when unselected or no longer listed.
    #[must_use]
    pub fn current_endpoint(&self) -> Option<EndpointId> {
        let id = self.inner.settings.selection().endpoint?;
        self.snapshot().get(id).map(|e| e.id)
    }

    /// Current selection with stale halves treated as unselected.
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection {
            endpoint: self.current_endpoint(),
            protocol: self.current_protocol_index(),
        }
    }

    fn protocol_options(&self) -> &'static [ProtocolOption] {
        self.inner
            .settings
            .encryption()
            .unwrap_or_default()
            .protocols()
    }

    fn record(&self, selection: Selection) {
        if let Err(e) = self.inner.settings.save_selection(selection) {
            warn!(error = %e, "failed to save selection");
        }
    }
}
