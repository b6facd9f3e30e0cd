use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{conn_key, pairings, ConnState, Connection, Room};
use crate::store::RoomStore;

/// Counter the pair sequence numbers are drawn from. Shared by every room
/// so an allocation is a single atomic increment; uniqueness within a
/// room follows from global monotonicity.
const CONN_SEQ_KEY: &str = "conn_seq";

/// Outcome of a join or refresh: the room's full pairwise connection list
/// plus whether any sequence number changed during the call.
#[derive(Debug)]
pub struct CallUpdate {
    pub conns: Vec<ConnState>,
    pub dirty: bool,
}

/// Coordinates room membership and per-pair connection state. Every
/// operation is one optimistic-concurrency transaction: read the room with
/// its version, compute the next state in isolation, write it back
/// conditioned on the version, and start over from a fresh read when a
/// concurrent writer won. Callers never block each other.
#[derive(Clone)]
pub struct RoomCoordinator {
    store: Arc<dyn RoomStore>,
    room_size: usize,
    auto_destroy_room_size: usize,
    room_ttl_seconds: u64,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn RoomStore>, config: &Config) -> Self {
        Self {
            store,
            room_size: config.room_size,
            auto_destroy_room_size: config.auto_destroy_room_size,
            room_ttl_seconds: config.room_ttl_seconds,
        }
    }

    /// Ensures `uid` is a member of the room, creating the room if needed.
    /// Fails with `RoomFull` when occupancy is already at the cap.
    pub async fn join(&self, rid: &str, uid: &str) -> Result<CallUpdate> {
        let mut retries = 0u32;
        loop {
            let (mut room, version) = match self.store.read(rid).await? {
                Some(found) => found,
                None => {
                    // Lazy creation; losing the creation race is fine, the
                    // next read sees the winner's room.
                    self.store
                        .create_if_absent(rid, &Room::default(), self.room_ttl_seconds)
                        .await?;
                    continue;
                }
            };

            if room.occupancy() >= self.room_size {
                return Err(AppError::RoomFull);
            }

            let mut dirty = false;
            if !room.has_user(uid) {
                room.add_user(uid);
                dirty = true;
            }

            let (conns, bumped) = self.refresh_conns(&mut room, uid, &[]).await?;
            dirty = dirty || bumped;

            if self
                .store
                .compare_and_swap(rid, Some(&room), version, self.room_ttl_seconds)
                .await?
            {
                tracing::info!(rid = %rid, uid = %uid, retries, "user joined room");
                return Ok(CallUpdate { conns, dirty });
            }
            retries += 1;
        }
    }

    /// Re-evaluates connection state without changing membership. `pc_err`
    /// is the set of peers the invoking client reports a connectivity
    /// error with. The write always lands (re-arming the room TTL) even
    /// when nothing changed.
    pub async fn refresh(&self, rid: &str, uid: &str, pc_err: &[String]) -> Result<CallUpdate> {
        let mut retries = 0u32;
        loop {
            let Some((mut room, version)) = self.store.read(rid).await? else {
                return Err(AppError::UnknownRoom(rid.to_string()));
            };

            let (conns, dirty) = self.refresh_conns(&mut room, uid, pc_err).await?;

            if self
                .store
                .compare_and_swap(rid, Some(&room), version, self.room_ttl_seconds)
                .await?
            {
                tracing::debug!(rid = %rid, uid = %uid, retries, dirty, "room refreshed");
                return Ok(CallUpdate { conns, dirty });
            }
            retries += 1;
        }
    }

    /// Removes `uid` and every connection record referencing it. When the
    /// remaining occupancy is at or below the auto-destroy threshold the
    /// whole room is deleted instead of written back.
    pub async fn leave(&self, rid: &str, uid: &str) -> Result<()> {
        let mut retries = 0u32;
        loop {
            let Some((mut room, version)) = self.store.read(rid).await? else {
                return Err(AppError::UnknownRoom(rid.to_string()));
            };

            if !room.has_user(uid) {
                tracing::warn!(rid = %rid, uid = %uid, "leave for user not in room");
                return Ok(());
            }

            room.remove_user(uid);
            let next = if room.occupancy() <= self.auto_destroy_room_size {
                None
            } else {
                Some(&room)
            };

            if self
                .store
                .compare_and_swap(rid, next, version, self.room_ttl_seconds)
                .await?
            {
                tracing::info!(rid = %rid, uid = %uid, retries, "user left room");
                return Ok(());
            }
            retries += 1;
        }
    }

    /// Walks every pair of current members in `pairings` order, creating
    /// missing connection records and applying error-triggered bumps.
    ///
    /// A reported peer error bumps the pair's sequence once and arms
    /// `pending_error_ack`; while the flag is armed the next report on the
    /// pair clears it instead of bumping, alternating bump/suppress for a
    /// persistently failing pair. Sequence numbers allocated here are not
    /// rolled back when the enclosing CAS loses; gaps are expected.
    async fn refresh_conns(
        &self,
        room: &mut Room,
        invoker: &str,
        pc_err: &[String],
    ) -> Result<(Vec<ConnState>, bool)> {
        let mut conns = Vec::new();
        let mut dirty = false;

        for (offerer, answerer) in pairings(&room.users) {
            let seq = match room.conns.entry(conn_key(&offerer, &answerer)) {
                Entry::Vacant(slot) => {
                    let seq = self.store.atomic_increment(CONN_SEQ_KEY).await?;
                    slot.insert(Connection {
                        offerer: offerer.clone(),
                        answerer: answerer.clone(),
                        seq,
                        pending_error_ack: false,
                    });
                    dirty = true;
                    seq
                }
                Entry::Occupied(mut slot) => {
                    let conn = slot.get_mut();
                    let peer = if conn.offerer == invoker {
                        Some(conn.answerer.clone())
                    } else if conn.answerer == invoker {
                        Some(conn.offerer.clone())
                    } else {
                        None
                    };
                    if peer.is_some_and(|p| pc_err.contains(&p)) {
                        if conn.pending_error_ack {
                            conn.pending_error_ack = false;
                        } else {
                            conn.seq = self.store.atomic_increment(CONN_SEQ_KEY).await?;
                            conn.pending_error_ack = true;
                            dirty = true;
                        }
                    }
                    conn.seq
                }
            };

            conns.push(ConnState {
                offerer,
                answerer,
                seq,
            });
        }

        Ok((conns, dirty))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryRoomStore;

    fn test_config() -> Config {
        Config {
            server_host: "localhost".to_string(),
            server_port: 8080,
            redis_url: "redis://localhost".to_string(),
            room_ttl_seconds: 60,
            room_size: 8,
            auto_destroy_room_size: 0,
            wss_host_port_pair: "localhost:8089".to_string(),
            ice_server_host: "127.0.0.1".to_string(),
            transit_secret: "test-secret".to_string(),
            transit_user: "peercall".to_string(),
            transit_ttl_seconds: 600,
        }
    }

    fn setup(config: &Config) -> (Arc<MemoryRoomStore>, RoomCoordinator) {
        let store = Arc::new(MemoryRoomStore::new());
        let coordinator = RoomCoordinator::new(store.clone(), config);
        (store, coordinator)
    }

    fn seq_of(conns: &[ConnState], offerer: &str, answerer: &str) -> u64 {
        conns
            .iter()
            .find(|c| c.offerer == offerer && c.answerer == answerer)
            .unwrap_or_else(|| panic!("no conn {}/{} in {:?}", offerer, answerer, conns))
            .seq
    }

    fn errs(peers: &[&str]) -> Vec<String> {
        peers.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn scenario_join_refresh_leave() {
        let (_, c) = setup(&test_config());

        let update = c.join("1234", "u2").await.unwrap();
        assert!(update.conns.is_empty());
        assert!(update.dirty);

        let update = c.join("1234", "u1").await.unwrap();
        assert_eq!(update.conns.len(), 1);
        assert_eq!(seq_of(&update.conns, "u1", "u2"), 1);

        let update = c.join("1234", "u3").await.unwrap();
        assert_eq!(update.conns.len(), 3);
        assert_eq!(seq_of(&update.conns, "u1", "u2"), 1);
        assert_eq!(seq_of(&update.conns, "u3", "u1"), 2);
        assert_eq!(seq_of(&update.conns, "u3", "u2"), 3);

        // u1 reports an error against u2: that pair bumps, others hold.
        let update = c.refresh("1234", "u1", &errs(&["u2"])).await.unwrap();
        assert!(update.dirty);
        assert_eq!(seq_of(&update.conns, "u1", "u2"), 4);
        assert_eq!(seq_of(&update.conns, "u3", "u1"), 2);
        assert_eq!(seq_of(&update.conns, "u3", "u2"), 3);

        // u2 reports against u1 and u3: (u1,u2) already has its bump
        // pending, so only the flag clears; (u3,u2) bumps.
        let update = c.refresh("1234", "u2", &errs(&["u1", "u3"])).await.unwrap();
        assert!(update.dirty);
        assert_eq!(seq_of(&update.conns, "u1", "u2"), 4);
        assert_eq!(seq_of(&update.conns, "u3", "u1"), 2);
        assert_eq!(seq_of(&update.conns, "u3", "u2"), 5);

        // u3's report against u2 lands on the armed flag: suppressed.
        let update = c.refresh("1234", "u3", &errs(&["u2"])).await.unwrap();
        assert!(!update.dirty);
        assert_eq!(seq_of(&update.conns, "u3", "u2"), 5);

        // Plain refreshes change nothing.
        for uid in ["u1", "u2", "u3"] {
            let update = c.refresh("1234", uid, &[]).await.unwrap();
            assert!(!update.dirty);
            assert_eq!(update.conns.len(), 3);
            assert_eq!(seq_of(&update.conns, "u1", "u2"), 4);
            assert_eq!(seq_of(&update.conns, "u3", "u1"), 2);
            assert_eq!(seq_of(&update.conns, "u3", "u2"), 5);
        }

        c.leave("1234", "u3").await.unwrap();

        let update = c.refresh("1234", "u1", &[]).await.unwrap();
        assert_eq!(update.conns.len(), 1);
        assert_eq!(seq_of(&update.conns, "u1", "u2"), 4);
    }

    #[tokio::test]
    async fn rejoin_of_member_changes_nothing() {
        let (_, c) = setup(&test_config());
        c.join("r", "a").await.unwrap();
        let first = c.join("r", "b").await.unwrap();
        assert_eq!(seq_of(&first.conns, "b", "a"), 1);

        let again = c.join("r", "b").await.unwrap();
        assert!(!again.dirty);
        assert_eq!(seq_of(&again.conns, "b", "a"), 1);
    }

    #[tokio::test]
    async fn join_beyond_cap_is_rejected_without_mutation() {
        let mut config = test_config();
        config.room_size = 2;
        let (store, c) = setup(&config);

        c.join("r", "a").await.unwrap();
        c.join("r", "b").await.unwrap();

        let err = c.join("r", "c").await.unwrap_err();
        assert!(matches!(err, AppError::RoomFull));

        let (room, version) = store.read("r").await.unwrap().unwrap();
        assert_eq!(room.users, vec!["a".to_string(), "b".to_string()]);
        // Two joins, two writes: the rejected join left no trace.
        assert_eq!(version, 3);
    }

    #[tokio::test]
    async fn refresh_of_unknown_room_fails() {
        let (_, c) = setup(&test_config());
        let err = c.refresh("nope", "a", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownRoom(_)));
    }

    #[tokio::test]
    async fn refresh_by_non_member_mutates_nothing() {
        let (_, c) = setup(&test_config());
        c.join("r", "a").await.unwrap();
        c.join("r", "b").await.unwrap();

        let update = c.refresh("r", "stranger", &errs(&["a"])).await.unwrap();
        assert!(!update.dirty);
        assert_eq!(seq_of(&update.conns, "b", "a"), 1);
    }

    #[tokio::test]
    async fn leave_of_unknown_room_fails() {
        let (_, c) = setup(&test_config());
        let err = c.leave("nope", "a").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownRoom(_)));
    }

    #[tokio::test]
    async fn leave_of_non_member_succeeds_without_mutation() {
        let (store, c) = setup(&test_config());
        c.join("r", "a").await.unwrap();
        c.join("r", "b").await.unwrap();

        c.leave("r", "stranger").await.unwrap();

        let (room, _) = store.read("r").await.unwrap().unwrap();
        assert_eq!(room.occupancy(), 2);
    }

    #[tokio::test]
    async fn last_leave_destroys_the_room() {
        let (store, c) = setup(&test_config());
        c.join("r", "a").await.unwrap();
        c.join("r", "b").await.unwrap();

        c.leave("r", "a").await.unwrap();
        assert!(store.read("r").await.unwrap().is_some());

        c.leave("r", "b").await.unwrap();
        assert!(store.read("r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_threshold_applies_above_zero() {
        let mut config = test_config();
        config.auto_destroy_room_size = 1;
        let (store, c) = setup(&config);

        c.join("r", "a").await.unwrap();
        c.join("r", "b").await.unwrap();

        // Dropping to one occupant hits the threshold: room gone.
        c.leave("r", "b").await.unwrap();
        assert!(store.read("r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn leave_cascades_connection_removal() {
        let (store, c) = setup(&test_config());
        c.join("r", "a").await.unwrap();
        c.join("r", "b").await.unwrap();
        c.join("r", "c").await.unwrap();

        c.leave("r", "b").await.unwrap();

        let (room, _) = store.read("r").await.unwrap().unwrap();
        assert!(room
            .conns
            .values()
            .all(|conn| conn.offerer != "b" && conn.answerer != "b"));
        let update = c.refresh("r", "a", &[]).await.unwrap();
        assert_eq!(update.conns.len(), 1);
        assert_eq!(seq_of(&update.conns, "c", "a"), 3);
    }

    #[tokio::test]
    async fn cas_conflict_retries_with_fresh_allocation() {
        let (store, c) = setup(&test_config());
        c.join("r", "a").await.unwrap();

        // The first attempt allocates seq 1, loses its CAS, and the retry
        // allocates anew: the gap is permanent, the value never reused.
        store.inject_cas_conflicts(1);
        let update = c.join("r", "b").await.unwrap();
        assert_eq!(seq_of(&update.conns, "b", "a"), 2);

        let update = c.join("r", "c").await.unwrap();
        assert_eq!(seq_of(&update.conns, "c", "b"), 3);
        assert_eq!(seq_of(&update.conns, "c", "a"), 4);
    }

    #[tokio::test]
    async fn roles_are_stable_across_reruns() {
        let history = ["u2", "u1", "u3", "u4"];

        let mut runs = Vec::new();
        for _ in 0..2 {
            let (_, c) = setup(&test_config());
            let mut last = Vec::new();
            for uid in history {
                last = c.join("room", uid).await.unwrap().conns;
            }
            runs.push(
                last.into_iter()
                    .map(|conn| (conn.offerer, conn.answerer))
                    .collect::<Vec<_>>(),
            );
        }

        assert_eq!(runs[0], runs[1]);
    }

    #[tokio::test]
    async fn concurrent_joins_all_land() {
        let mut config = test_config();
        config.room_size = 32;
        let (store, c) = setup(&config);

        let mut handles = Vec::new();
        for i in 0..8 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                c.join("busy", &format!("u{}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let (room, _) = store.read("busy").await.unwrap().unwrap();
        assert_eq!(room.occupancy(), 8);
        // 8 members: every unordered pair has exactly one record.
        assert_eq!(room.conns.len(), 8 * 7 / 2);

        let mut seqs: Vec<u64> = room.conns.values().map(|conn| conn.seq).collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 8 * 7 / 2);
    }
}
