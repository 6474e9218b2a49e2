use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::seq::IndexedRandom;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::messages::SyncData;
use super::record::{MemberStatus, MembershipEvent, MembershipRecord};
use super::{MEMBERSHIP_GOSSIP, SYNC, SYNC_ACK};
use crate::error::Result;
use crate::events::{EventStream, Subscription};
use crate::fdetector::{FailureDetector, FailureDetectorEvent, MemberStatusKind};
use crate::gossip::GossipProtocol;
use crate::membership_error;
use crate::settings::MembershipConfig;
use crate::transport::{Address, Message, Transport};

/// Per-member timer: suspicion while SUSPECT, cleanup while DEAD
struct MemberTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct MembershipInner {
    local_id: String,
    local_address: Address,
    local_member: RwLock<MembershipRecord>,
    /// Remote members by id, DEAD records included until cleanup
    members: RwLock<HashMap<String, MembershipRecord>>,
    /// Held from a table write until its events and detector calls are done
    reconcile: Mutex<()>,
    transport: Arc<dyn Transport>,
    config: MembershipConfig,
    failure_detector: FailureDetector,
    gossip: GossipProtocol,
    left: AtomicBool,
    timers: DashMap<String, MemberTimer>,
    timer_generation: AtomicU64,
    pending_syncs: DashMap<String, oneshot::Sender<()>>,
    sync_sequence: AtomicU64,
    events: EventStream<MembershipEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stopped: AtomicBool,
}

#[derive(Clone)]
pub struct MembershipProtocol {
    inner: Arc<MembershipInner>,
}

impl MembershipProtocol {
    pub fn new(
        member_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: MembershipConfig,
        failure_detector: FailureDetector,
        gossip: GossipProtocol,
    ) -> Self {
        let local_id = member_id.into();
        let local_address = transport.local_address();
        let local_member =
            MembershipRecord::new(local_id.clone(), local_address, config.metadata.clone());
        Self {
            inner: Arc::new(MembershipInner {
                local_id,
                local_address,
                local_member: RwLock::new(local_member),
                members: RwLock::new(HashMap::new()),
                reconcile: Mutex::new(()),
                transport,
                config,
                failure_detector,
                gossip,
                left: AtomicBool::new(false),
                timers: DashMap::new(),
                timer_generation: AtomicU64::new(0),
                pending_syncs: DashMap::new(),
                sync_sequence: AtomicU64::new(0),
                events: EventStream::default(),
                tasks: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribes to detector, gossip and sync traffic, syncs with the seeds,
    /// then schedules periodic sync. A seed that never answers is logged, not fatal.
    pub async fn start(&self) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire)
            || self.inner.running.swap(true, Ordering::AcqRel)
        {
            return Ok(());
        }
        let mut syncs = self.inner.transport.listen(SYNC);
        let mut sync_acks = self.inner.transport.listen(SYNC_ACK);
        let mut statuses = self.inner.failure_detector.listen_status();
        let mut gossips = self.inner.gossip.listen();
        let id = self.inner.local_id.clone();

        {
            let mut tasks = self.inner.tasks.lock();

            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(message) = syncs.recv().await {
                    if let Err(e) = this.on_sync(message).await {
                        warn!("[{}] Failed to answer SYNC: {}", this.inner.local_id, e);
                    }
                }
            }));

            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(message) = sync_acks.recv().await {
                    if let Err(e) = this.on_sync_ack(message) {
                        warn!("[{}] Dropping SYNC_ACK: {}", this.inner.local_id, e);
                    }
                }
            }));

            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = statuses.recv().await {
                    this.on_detector_event(event);
                }
            }));

            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(message) = gossips.recv().await {
                    if message.qualifier != MEMBERSHIP_GOSSIP {
                        continue;
                    }
                    match message.data::<MembershipRecord>() {
                        Ok(record) => this.update_membership(record),
                        Err(e) => warn!("[{}] Dropping membership gossip: {}", this.inner.local_id, e),
                    }
                }
            }));
        }

        let seeds = self.seed_members();
        if !seeds.is_empty() {
            info!("[{}] Syncing with seeds {:?}", id, seeds);
            if !self.do_sync(seeds).await? {
                warn!(
                    "[{}] No seed answered within {}ms, starting alone",
                    id,
                    self.inner.config.sync_timeout.as_millis()
                );
            }
        }

        let this = self.clone();
        self.inner.tasks.lock().push(tokio::spawn(async move {
            let mut ticker = interval(this.inner.config.sync_time);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = this.periodic_sync().await {
                    error!("[{}] Periodic sync failed: {}", this.inner.local_id, e);
                }
            }
        }));

        info!(
            "[{}] Membership started on {} with {} known members",
            id,
            self.inner.local_address,
            self.members().len()
        );
        Ok(())
    }

    /// Idempotent; completes the event stream
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.running.store(false, Ordering::Release);
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
        let timers: Vec<String> = self.inner.timers.iter().map(|t| t.key().clone()).collect();
        for id in timers {
            self.cancel_timer(&id);
        }
        self.inner.pending_syncs.clear();
        self.inner.events.complete();
        info!("[{}] Membership stopped", self.inner.local_id);
    }

    /// Mark the local member DEAD and gossip the departure
    pub fn leave(&self) -> Result<MembershipRecord> {
        self.inner.left.store(true, Ordering::Release);
        let record = {
            let mut local = self.inner.local_member.write();
            local.status = MemberStatus::Dead;
            local.clone()
        };
        info!("[{}] Leaving cluster as {}", self.inner.local_id, record);
        self.spread_record(&record)?;
        Ok(record)
    }

    pub fn listen(&self) -> Subscription<MembershipEvent> {
        self.inner.events.subscribe()
    }

    pub fn local_member(&self) -> MembershipRecord {
        self.inner.local_member.read().clone()
    }

    /// Every member not known to be DEAD, the local one included, ordered by id
    pub fn members(&self) -> Vec<MembershipRecord> {
        let local = self.local_member();
        let mut members = self.other_members();
        if !local.is_dead() {
            members.push(local);
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    pub fn other_members(&self) -> Vec<MembershipRecord> {
        let mut members: Vec<MembershipRecord> = self
            .inner
            .members
            .read()
            .values()
            .filter(|record| !record.is_dead())
            .cloned()
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    pub fn member(&self, id: &str) -> Option<MembershipRecord> {
        self.members().into_iter().find(|record| record.id == id)
    }

    pub fn member_by_address(&self, address: &Address) -> Option<MembershipRecord> {
        self.members()
            .into_iter()
            .find(|record| record.address == *address)
    }

    /// Local record plus every remote record, DEAD ones included
    fn snapshot(&self) -> Vec<MembershipRecord> {
        let mut records = vec![self.local_member()];
        records.extend(self.inner.members.read().values().cloned());
        records
    }

    fn seed_members(&self) -> Vec<Address> {
        self.inner
            .config
            .seed_members
            .iter()
            .copied()
            .filter(|seed| *seed != self.inner.local_address)
            .collect()
    }

    /// Apply an incoming claim to the table; accepted changes are gossiped on
    pub(crate) fn update_membership(&self, record: MembershipRecord) {
        if record.id == self.inner.local_id {
            self.on_local_claim(record);
            return;
        }
        if record.address == self.inner.local_address {
            trace!(
                "[{}] Ignoring {} claiming the local address",
                self.inner.local_id,
                record
            );
            return;
        }

        let _reconcile = self.inner.reconcile.lock();
        let mut changes = Vec::new();
        {
            let mut table = self.inner.members.write();
            match table.get(&record.id).cloned() {
                None if record.is_dead() => return,
                None => {
                    // a restarted member comes back under a new id at the same address
                    for previous in table
                        .values_mut()
                        .filter(|r| r.address == record.address && !r.is_dead())
                    {
                        let old = previous.clone();
                        previous.status = MemberStatus::Dead;
                        changes.push((Some(old), previous.clone()));
                    }
                    table.insert(record.id.clone(), record.clone());
                    changes.push((None, record));
                }
                Some(current) if !record.overrides(&current) => return,
                Some(current) => {
                    table.insert(record.id.clone(), record.clone());
                    changes.push((Some(current), record));
                }
            }
        }

        for (old, new) in changes {
            self.on_member_changed(old, new, true);
        }
        self.refresh_targets();
    }

    /// SUSPECT or DEAD claims about ourselves are refuted with a higher incarnation
    fn on_local_claim(&self, record: MembershipRecord) {
        if self.inner.left.load(Ordering::Acquire) || record.is_alive() {
            return;
        }
        let refuted = {
            let mut local = self.inner.local_member.write();
            if record.incarnation < local.incarnation {
                return;
            }
            local.incarnation = record.incarnation + 1;
            local.status = MemberStatus::Alive;
            local.clone()
        };
        info!(
            "[{}] Refuting {} claim, now incarnation {}",
            self.inner.local_id, record.status, refuted.incarnation
        );
        if let Err(e) = self.spread_record(&refuted) {
            warn!("[{}] Failed to gossip refutation: {}", self.inner.local_id, e);
        }
    }

    fn on_member_changed(&self, old: Option<MembershipRecord>, new: MembershipRecord, spread: bool) {
        let fd = &self.inner.failure_detector;
        match new.status {
            MemberStatus::Alive => {
                self.cancel_timer(&new.id);
                fd.trust(new.address);
            }
            MemberStatus::Suspect => {
                fd.suspect(new.address);
                self.schedule_timer(&new, self.inner.config.suspicion_timeout);
            }
            MemberStatus::Dead => {
                fd.trust(new.address);
                self.schedule_timer(&new, self.inner.config.dead_member_cleanup);
            }
        }

        let event = match old {
            None => Some(MembershipEvent::Added(new.clone())),
            Some(old) if old.is_dead() && new.is_dead() => None,
            Some(old) if old.is_dead() => Some(MembershipEvent::Added(new.clone())),
            Some(_) if new.is_dead() => Some(MembershipEvent::Removed(new.clone())),
            Some(old) => Some(MembershipEvent::Updated {
                old,
                new: new.clone(),
            }),
        };
        if let Some(event) = event {
            debug!("[{}] Member {}", self.inner.local_id, new);
            self.inner.events.publish(event);
        }

        if spread {
            if let Err(e) = self.spread_record(&new) {
                warn!("[{}] Failed to gossip {}: {}", self.inner.local_id, new, e);
            }
        }
    }

    fn spread_record(&self, record: &MembershipRecord) -> Result<()> {
        let message = Message::with_data(MEMBERSHIP_GOSSIP, record)?;
        self.inner.gossip.spread(message);
        Ok(())
    }

    /// Probe and gossip targets follow the non-DEAD remote members
    fn refresh_targets(&self) {
        let addresses: Vec<Address> = self
            .other_members()
            .into_iter()
            .map(|record| record.address)
            .collect();
        self.inner
            .failure_detector
            .set_cluster_members(addresses.clone());
        self.inner.gossip.set_cluster_members(addresses);
    }

    fn schedule_timer(&self, record: &MembershipRecord, after: Duration) {
        let generation = self.inner.timer_generation.fetch_add(1, Ordering::AcqRel);
        let this = self.clone();
        let id = record.id.clone();
        let status = record.status;
        let incarnation = record.incarnation;

        // countdown starts only after the entry is stored
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = armed_rx.await;
            tokio::time::sleep(after).await;
            this.inner
                .timers
                .remove_if(&id, |_, timer| timer.generation == generation);
            this.on_timer_expired(&id, status, incarnation);
        });
        if let Some(previous) = self
            .inner
            .timers
            .insert(record.id.clone(), MemberTimer { generation, handle })
        {
            previous.handle.abort();
        }
        let _ = armed_tx.send(());
    }

    fn cancel_timer(&self, id: &str) {
        if let Some((_, timer)) = self.inner.timers.remove(id) {
            timer.handle.abort();
        }
    }

    fn on_timer_expired(&self, id: &str, status: MemberStatus, incarnation: u64) {
        let current = self.inner.members.read().get(id).cloned();
        let current = match current {
            Some(current) if current.status == status && current.incarnation == incarnation => current,
            _ => return,
        };

        match status {
            MemberStatus::Suspect => {
                info!(
                    "[{}] Suspicion of {} timed out, declaring DEAD",
                    self.inner.local_id, current
                );
                self.update_membership(current.with_status(MemberStatus::Dead));
            }
            MemberStatus::Dead => {
                self.inner.members.write().remove(id);
                debug!("[{}] Cleaned up {}", self.inner.local_id, current);
            }
            MemberStatus::Alive => {}
        }
    }

    fn on_detector_event(&self, event: FailureDetectorEvent) {
        let current = self
            .inner
            .members
            .read()
            .values()
            .find(|record| record.address == event.member && !record.is_dead())
            .cloned();
        let current = match current {
            Some(current) => current,
            None => return,
        };

        match event.kind {
            MemberStatusKind::Suspected if current.is_alive() => {
                debug!("[{}] Detector suspects {}", self.inner.local_id, current);
                self.update_membership(current.with_status(MemberStatus::Suspect));
            }
            MemberStatusKind::Trusted if current.is_suspect() => {
                self.restore_alive(&current);
            }
            _ => {}
        }
    }

    /// Local override of a SUSPECT record after the detector reached it again
    fn restore_alive(&self, suspect: &MembershipRecord) {
        let _reconcile = self.inner.reconcile.lock();
        let change = {
            let mut table = self.inner.members.write();
            match table.get_mut(&suspect.id) {
                Some(current)
                    if current.is_suspect() && current.incarnation == suspect.incarnation =>
                {
                    let old = current.clone();
                    current.status = MemberStatus::Alive;
                    Some((old, current.clone()))
                }
                _ => None,
            }
        };
        if let Some((old, new)) = change {
            debug!("[{}] Detector trusts {} again", self.inner.local_id, new);
            self.on_member_changed(Some(old), new, false);
        }
    }

    /// Send our snapshot to `targets` and wait for the first SYNC_ACK.
    /// Returns whether one arrived within `sync_timeout`.
    async fn do_sync(&self, targets: Vec<Address>) -> Result<bool> {
        let sequence = self.inner.sync_sequence.fetch_add(1, Ordering::AcqRel);
        let cid = format!("{}-sync-{}", self.inner.local_id, sequence);
        let (tx, rx) = oneshot::channel();
        self.inner.pending_syncs.insert(cid.clone(), tx);

        let message = Message::with_data(
            SYNC,
            &SyncData {
                membership: self.snapshot(),
            },
        )?
        .with_correlation_id(cid.clone());
        for target in &targets {
            trace!("[{}] SYNC {} to {}", self.inner.local_id, cid, target);
            if let Err(e) = self.inner.transport.send(*target, message.clone()).await {
                warn!("[{}] Failed to send SYNC to {}: {}", self.inner.local_id, target, e);
            }
        }

        let acked = matches!(timeout(self.inner.config.sync_timeout, rx).await, Ok(Ok(())));
        self.inner.pending_syncs.remove(&cid);
        if !acked {
            debug!("[{}] SYNC {} timed out", self.inner.local_id, cid);
        }
        Ok(acked)
    }

    async fn periodic_sync(&self) -> Result<()> {
        let target = {
            let others = self.other_members();
            others
                .choose(&mut rand::rng())
                .map(|record| record.address)
        };
        let targets = match target {
            Some(target) => vec![target],
            None => self.seed_members(),
        };
        if targets.is_empty() {
            return Ok(());
        }
        if !self.do_sync(targets).await? {
            warn!("[{}] Periodic sync got no answer", self.inner.local_id);
        }
        Ok(())
    }

    async fn on_sync(&self, message: Message) -> Result<()> {
        let data: SyncData = message.data()?;
        let sender = message
            .sender
            .ok_or_else(|| membership_error!("SYNC without sender"))?;
        trace!(
            "[{}] SYNC from {} with {} records",
            self.inner.local_id,
            sender,
            data.membership.len()
        );
        for record in data.membership {
            self.update_membership(record);
        }

        let mut reply = Message::with_data(
            SYNC_ACK,
            &SyncData {
                membership: self.snapshot(),
            },
        )?;
        reply.correlation_id = message.correlation_id;
        self.inner.transport.send(sender, reply).await
    }

    fn on_sync_ack(&self, message: Message) -> Result<()> {
        let data: SyncData = message.data()?;
        for record in data.membership {
            self.update_membership(record);
        }
        if let Some(cid) = message.correlation_id {
            if let Some((_, waiter)) = self.inner.pending_syncs.remove(&cid) {
                let _ = waiter.send(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FailureDetectorConfig, GossipConfig};
    use crate::transport::MemoryNetwork;
    use std::collections::BTreeMap;
    use tokio::time::sleep;

    fn membership_config(seeds: Vec<Address>) -> MembershipConfig {
        MembershipConfig {
            seed_members: seeds,
            sync_time: Duration::from_secs(30),
            sync_timeout: Duration::from_millis(500),
            suspicion_timeout: Duration::from_millis(100),
            dead_member_cleanup: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn membership_node(network: &MemoryNetwork, id: &str, config: MembershipConfig) -> MembershipProtocol {
        let transport: Arc<dyn Transport> = Arc::new(network.bind().unwrap());
        let fd = FailureDetector::new(Arc::clone(&transport), FailureDetectorConfig::default());
        let gossip = GossipProtocol::new(id, Arc::clone(&transport), GossipConfig::default());
        MembershipProtocol::new(id, transport, config, fd, gossip)
    }

    fn remote(id: &str, port: u16, status: MemberStatus, incarnation: u64) -> MembershipRecord {
        MembershipRecord {
            status,
            incarnation,
            ..MembershipRecord::new(id, Address::from(([127, 0, 0, 1], port)), BTreeMap::new())
        }
    }

    #[tokio::test]
    async fn test_new_member_is_added_and_probed() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let mut events = a.listen();
        let b = remote("b", 9002, MemberStatus::Alive, 0);

        a.update_membership(b.clone());

        assert_eq!(events.try_recv(), Some(MembershipEvent::Added(b.clone())));
        assert_eq!(a.member("b"), Some(b.clone()));
        assert_eq!(a.member_by_address(&b.address), Some(b.clone()));
        assert_eq!(a.inner.failure_detector.members(), vec![b.address]);
        assert_eq!(a.inner.gossip.members(), vec![b.address]);
        assert_eq!(a.inner.gossip.pending_gossips().len(), 1);
        assert_eq!(a.members().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_claims_are_ignored() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        a.update_membership(remote("b", 9002, MemberStatus::Alive, 3));
        let mut events = a.listen();

        a.update_membership(remote("b", 9002, MemberStatus::Dead, 2));
        a.update_membership(remote("b", 9002, MemberStatus::Alive, 3));

        assert!(events.try_recv().is_none());
        assert_eq!(a.member("b").unwrap().incarnation, 3);
        assert_eq!(a.inner.gossip.pending_gossips().len(), 1);
    }

    #[tokio::test]
    async fn test_higher_incarnation_replaces_regardless_of_status() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let suspect = remote("b", 9002, MemberStatus::Suspect, 1);
        a.update_membership(suspect.clone());
        assert!(a.inner.failure_detector.is_suspected(&suspect.address));
        let mut events = a.listen();

        let alive = remote("b", 9002, MemberStatus::Alive, 2);
        a.update_membership(alive.clone());

        assert_eq!(
            events.try_recv(),
            Some(MembershipEvent::Updated {
                old: suspect.clone(),
                new: alive.clone()
            })
        );
        assert!(!a.inner.failure_detector.is_suspected(&alive.address));

        // same incarnation ALIVE never beats SUSPECT
        a.update_membership(remote("b", 9002, MemberStatus::Suspect, 2));
        a.update_membership(remote("b", 9002, MemberStatus::Alive, 2));
        assert_eq!(a.member("b").unwrap().status, MemberStatus::Suspect);
    }

    #[tokio::test]
    async fn test_dead_member_is_removed_then_cleaned_up() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let b = remote("b", 9002, MemberStatus::Alive, 0);
        a.update_membership(b.clone());
        let mut events = a.listen();

        let dead = b.with_status(MemberStatus::Dead);
        a.update_membership(dead.clone());

        assert_eq!(events.try_recv(), Some(MembershipEvent::Removed(dead)));
        assert!(a.member("b").is_none());
        assert!(a.inner.failure_detector.members().is_empty());

        // kept around to reject the stale ALIVE
        a.update_membership(b.clone());
        assert!(a.member("b").is_none());
        assert!(events.try_recv().is_none());

        sleep(Duration::from_millis(400)).await;
        assert!(a.snapshot().iter().all(|record| record.id != "b"));
        assert!(a.inner.timers.is_empty());
    }

    #[tokio::test]
    async fn test_short_timers_leave_no_entries_behind() {
        let network = MemoryNetwork::new();
        let config = MembershipConfig {
            suspicion_timeout: Duration::from_millis(1),
            dead_member_cleanup: Duration::from_millis(1),
            ..membership_config(vec![])
        };
        let a = membership_node(&network, "a", config);
        let mut events = a.listen();

        a.update_membership(remote("b", 9002, MemberStatus::Suspect, 0));
        sleep(Duration::from_millis(100)).await;

        assert!(a.inner.timers.is_empty());
        assert!(a.snapshot().iter().all(|record| record.id != "b"));
        assert!(matches!(events.try_recv(), Some(MembershipEvent::Added(_))));
        assert!(matches!(events.try_recv(), Some(MembershipEvent::Removed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_publish_in_table_order() {
        let network = MemoryNetwork::new();
        let config = MembershipConfig {
            suspicion_timeout: Duration::from_secs(30),
            ..membership_config(vec![])
        };
        let a = membership_node(&network, "a", config);
        a.update_membership(remote("b", 9002, MemberStatus::Alive, 0));
        let mut events = a.listen();

        let mut updates = Vec::new();
        for incarnation in 1..=200u64 {
            let a = a.clone();
            let status = if incarnation % 2 == 0 {
                MemberStatus::Alive
            } else {
                MemberStatus::Suspect
            };
            updates.push(tokio::spawn(async move {
                a.update_membership(remote("b", 9002, status, incarnation));
            }));
        }
        for update in updates {
            update.await.unwrap();
        }

        let mut last = 0;
        while let Some(event) = events.try_recv() {
            match event {
                MembershipEvent::Updated { old, new } => {
                    assert_eq!(old.incarnation, last);
                    assert!(new.incarnation > old.incarnation);
                    last = new.incarnation;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        let current = a.member("b").unwrap();
        assert_eq!(current.incarnation, last);
        assert_eq!(current.incarnation, 200);
        assert_eq!(
            a.inner.failure_detector.is_suspected(&current.address),
            current.is_suspect()
        );
    }

    #[tokio::test]
    async fn test_sync_without_sender_is_rejected() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let message = Message::with_data(SYNC, &SyncData { membership: Vec::new() }).unwrap();

        let result = a.on_sync(message).await;
        assert!(matches!(result, Err(crate::error::GossamerError::Membership(_))));
    }

    #[tokio::test]
    async fn test_unknown_dead_member_is_ignored() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let mut events = a.listen();

        a.update_membership(remote("b", 9002, MemberStatus::Dead, 4));

        assert!(events.try_recv().is_none());
        assert_eq!(a.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_restarted_member_replaces_old_identity() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let old = remote("b-old", 9002, MemberStatus::Alive, 5);
        a.update_membership(old.clone());
        let mut events = a.listen();

        let new = remote("b-new", 9002, MemberStatus::Alive, 0);
        a.update_membership(new.clone());

        assert_eq!(
            events.try_recv(),
            Some(MembershipEvent::Removed(old.with_status(MemberStatus::Dead)))
        );
        assert_eq!(events.try_recv(), Some(MembershipEvent::Added(new.clone())));
        assert_eq!(a.other_members(), vec![new]);
    }

    #[tokio::test]
    async fn test_refutes_suspicion_about_itself() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let claim = a.local_member().with_status(MemberStatus::Suspect);

        a.update_membership(claim);

        let local = a.local_member();
        assert_eq!(local.status, MemberStatus::Alive);
        assert_eq!(local.incarnation, 1);
        assert_eq!(a.inner.gossip.pending_gossips().len(), 1);

        // an old claim is not worth refuting again
        a.update_membership(local.with_status(MemberStatus::Dead));
        assert_eq!(a.local_member().incarnation, 2);
        let stale = MembershipRecord {
            incarnation: 0,
            ..a.local_member().with_status(MemberStatus::Dead)
        };
        a.update_membership(stale);
        assert_eq!(a.local_member().incarnation, 2);
    }

    #[tokio::test]
    async fn test_leave_marks_local_dead_and_stops_refuting() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));

        let left = a.leave().unwrap();
        assert_eq!(left.status, MemberStatus::Dead);
        assert!(a.members().is_empty());
        assert_eq!(a.inner.gossip.pending_gossips().len(), 1);

        a.update_membership(left.clone());
        assert_eq!(a.local_member(), left);
    }

    #[tokio::test]
    async fn test_suspicion_times_out_to_dead() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let b = remote("b", 9002, MemberStatus::Alive, 0);
        a.update_membership(b.clone());
        let mut events = a.listen();

        a.on_detector_event(FailureDetectorEvent::suspected(b.address));
        assert_eq!(a.member("b").unwrap().status, MemberStatus::Suspect);

        let updated = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(updated, MembershipEvent::Updated { .. }));
        let removed = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(removed, MembershipEvent::Removed(b.with_status(MemberStatus::Dead)));
    }

    #[tokio::test]
    async fn test_trusted_restores_alive_without_gossip() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        let b = remote("b", 9002, MemberStatus::Suspect, 1);
        a.update_membership(b.clone());
        let gossips_before = a.inner.gossip.pending_gossips().len();

        a.on_detector_event(FailureDetectorEvent::trusted(b.address));

        assert_eq!(a.member("b").unwrap().status, MemberStatus::Alive);
        assert_eq!(a.inner.gossip.pending_gossips().len(), gossips_before);
        // the suspicion timer was cancelled
        sleep(Duration::from_millis(250)).await;
        assert_eq!(a.member("b").unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn test_sync_with_seed() {
        let network = MemoryNetwork::new();
        let seed = membership_node(&network, "seed", membership_config(vec![]));
        seed.start().await.unwrap();
        let seed_address = seed.inner.local_address;

        let joiner = membership_node(&network, "joiner", membership_config(vec![seed_address]));
        joiner.start().await.unwrap();

        assert!(joiner.member("seed").is_some());
        assert!(seed.member("joiner").is_some());
        assert_eq!(
            joiner.members().iter().map(|m| m.id.clone()).collect::<Vec<_>>(),
            vec!["joiner".to_string(), "seed".to_string()]
        );

        joiner.stop();
        seed.stop();
    }

    #[tokio::test]
    async fn test_start_without_reachable_seed() {
        let network = MemoryNetwork::new();
        let nowhere: Address = "127.0.0.1:9999".parse().unwrap();
        let a = membership_node(&network, "a", membership_config(vec![nowhere]));

        a.start().await.unwrap();

        assert_eq!(a.members().len(), 1);
        assert!(a.inner.pending_syncs.is_empty());
        a.stop();
    }

    #[tokio::test]
    async fn test_stop_completes_events() {
        let network = MemoryNetwork::new();
        let a = membership_node(&network, "a", membership_config(vec![]));
        a.update_membership(remote("b", 9002, MemberStatus::Suspect, 0));
        let mut events = a.listen();
        a.start().await.unwrap();
        a.stop();
        a.stop();

        let end = timeout(Duration::from_millis(200), events.recv()).await.unwrap();
        assert!(end.is_none());
        assert!(a.inner.timers.is_empty());
    }
}
