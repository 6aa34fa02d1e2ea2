use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::events::{EventEmitter, StudyRoomEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Moderator,
    #[default]
    Guest,
}

impl ParticipantRole {
    /// Parse a role attribute. Anything unrecognised is a guest.
    pub fn from_attribute(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => ParticipantRole::Owner,
            "moderator" => ParticipantRole::Moderator,
            _ => ParticipantRole::Guest,
        }
    }
}

/// Presence state of one connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Transport-assigned session id, unique within a room.
    pub identity: String,
    pub display_name: String,
    pub microphone_enabled: bool,
    pub camera_enabled: bool,
    pub role: ParticipantRole,
    pub is_local_user: bool,
}

impl Participant {
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            microphone_enabled: false,
            camera_enabled: false,
            role: ParticipantRole::Guest,
            is_local_user: false,
        }
    }
}

/// Fields to shallow-merge into an existing participant. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantPatch {
    pub display_name: Option<String>,
    pub microphone_enabled: Option<bool>,
    pub camera_enabled: Option<bool>,
    pub role: Option<ParticipantRole>,
    pub is_local_user: Option<bool>,
}

impl ParticipantPatch {
    fn apply(self, p: &mut Participant) {
        if let Some(name) = self.display_name {
            p.display_name = name;
        }
        if let Some(mic) = self.microphone_enabled {
            p.microphone_enabled = mic;
        }
        if let Some(cam) = self.camera_enabled {
            p.camera_enabled = cam;
        }
        if let Some(role) = self.role {
            p.role = role;
        }
        if let Some(local) = self.is_local_user {
            p.is_local_user = local;
        }
    }
}

/// Participants of the current room, in join order.
///
/// Every mutator is total and returns whether the roster actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantRoster {
    participants: Vec<Participant>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole roster. Later duplicates of an identity are dropped.
    pub fn set(&mut self, participants: Vec<Participant>) {
        self.participants.clear();
        for p in participants {
            self.add(p);
        }
    }

    /// Insert a participant. An already-present identity is left untouched.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.identity) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    pub fn remove(&mut self, identity: &str) -> Option<Participant> {
        let idx = self.participants.iter().position(|p| p.identity == identity)?;
        Some(self.participants.remove(idx))
    }

    pub fn update(&mut self, identity: &str, patch: ParticipantPatch) -> bool {
        let Some(p) = self.participant_mut(identity) else {
            return false;
        };
        let before = p.clone();
        patch.apply(p);
        *p != before
    }

    pub fn set_mic_on(&mut self, identity: &str, enabled: bool) -> bool {
        self.update(identity, ParticipantPatch {
            microphone_enabled: Some(enabled),
            ..Default::default()
        })
    }

    pub fn set_camera_on(&mut self, identity: &str, enabled: bool) -> bool {
        self.update(identity, ParticipantPatch {
            camera_enabled: Some(enabled),
            ..Default::default()
        })
    }

    pub fn set_nickname(&mut self, identity: &str, name: impl Into<String>) -> bool {
        self.update(identity, ParticipantPatch {
            display_name: Some(name.into()),
            ..Default::default()
        })
    }

    pub fn reset(&mut self) {
        self.participants.clear();
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.participants.iter().any(|p| p.identity == identity)
    }

    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identity == identity)
    }

    fn participant_mut(&mut self, identity: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.identity == identity)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn local_participant(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_local_user)
    }

    pub fn owner(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.role == ParticipantRole::Owner)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Shared roster for the current room.
///
/// Mutations go through this type only. Each effective change is emitted as a
/// [`StudyRoomEvent`] after the lock is released, so listeners may read back.
#[derive(Clone)]
pub struct RosterStore {
    roster: Arc<Mutex<ParticipantRoster>>,
    emitter: EventEmitter,
}

impl RosterStore {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            roster: Arc::new(Mutex::new(ParticipantRoster::new())),
            emitter,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ParticipantRoster) -> R) -> R {
        let mut roster = self.roster.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut roster)
    }

    pub fn snapshot(&self) -> ParticipantRoster {
        self.with(|r| r.clone())
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.with(|r| r.participants().to_vec())
    }

    pub fn participant(&self, identity: &str) -> Option<Participant> {
        self.with(|r| r.participant(identity).cloned())
    }

    pub fn len(&self) -> usize {
        self.with(|r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|r| r.is_empty())
    }

    pub fn set(&self, participants: Vec<Participant>) {
        let current = self.with(|r| {
            r.set(participants);
            r.participants().to_vec()
        });
        self.emitter.emit(StudyRoomEvent::RosterReset);
        for p in current {
            self.emitter.emit(StudyRoomEvent::ParticipantJoined(p));
        }
    }

    pub fn add(&self, participant: Participant) -> bool {
        let added = self.with(|r| r.add(participant.clone()));
        if added {
            tracing::debug!("participant joined: {}", participant.identity);
            self.emitter.emit(StudyRoomEvent::ParticipantJoined(participant));
        }
        added
    }

    pub fn remove(&self, identity: &str) -> bool {
        let removed = self.with(|r| r.remove(identity));
        if removed.is_some() {
            tracing::debug!("participant left: {identity}");
            self.emitter.emit(StudyRoomEvent::ParticipantLeft(identity.to_string()));
        }
        removed.is_some()
    }

    pub fn update(&self, identity: &str, patch: ParticipantPatch) -> bool {
        self.mutate(identity, |r| r.update(identity, patch))
    }

    pub fn set_mic_on(&self, identity: &str, enabled: bool) -> bool {
        self.mutate(identity, |r| r.set_mic_on(identity, enabled))
    }

    pub fn set_camera_on(&self, identity: &str, enabled: bool) -> bool {
        self.mutate(identity, |r| r.set_camera_on(identity, enabled))
    }

    pub fn set_nickname(&self, identity: &str, name: impl Into<String>) -> bool {
        let name = name.into();
        self.mutate(identity, |r| r.set_nickname(identity, name))
    }

    pub fn reset(&self) {
        self.with(|r| r.reset());
        self.emitter.emit(StudyRoomEvent::RosterReset);
    }

    fn mutate(&self, identity: &str, f: impl FnOnce(&mut ParticipantRoster) -> bool) -> bool {
        let updated = self.with(|r| {
            if f(r) { r.participant(identity).cloned() } else { None }
        });
        match updated {
            Some(p) => {
                self.emitter.emit(StudyRoomEvent::ParticipantUpdated(p));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StudyRoomEventListener;
    use std::collections::HashMap;

    fn make_participant(identity: &str, name: &str) -> Participant {
        Participant::new(identity, name)
    }

    struct EventCapture {
        events: Arc<Mutex<Vec<StudyRoomEvent>>>,
    }

    impl StudyRoomEventListener for EventCapture {
        fn on_event(&self, event: StudyRoomEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn store_with_capture() -> (RosterStore, Arc<Mutex<Vec<StudyRoomEvent>>>) {
        let emitter = EventEmitter::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        emitter.add_listener(Arc::new(EventCapture { events: events.clone() }));
        (RosterStore::new(emitter), events)
    }

    #[test]
    fn add_and_retrieve_participant() {
        let mut roster = ParticipantRoster::new();
        assert!(roster.add(make_participant("s1", "Alice")));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.participant("s1").unwrap().display_name, "Alice");
    }

    #[test]
    fn duplicate_add_leaves_entry_unchanged() {
        let mut roster = ParticipantRoster::new();
        roster.add(make_participant("s1", "Alice"));
        let mut dup = make_participant("s1", "Mallory");
        dup.role = ParticipantRole::Owner;

        assert!(!roster.add(dup));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.participant("s1"), Some(&make_participant("s1", "Alice")));
    }

    #[test]
    fn update_merges_only_supplied_fields() {
        let mut roster = ParticipantRoster::new();
        let mut p = make_participant("s1", "Alice");
        p.role = ParticipantRole::Moderator;
        roster.add(p);

        roster.update("s1", ParticipantPatch {
            camera_enabled: Some(true),
            ..Default::default()
        });

        let p = roster.participant("s1").unwrap();
        assert!(p.camera_enabled);
        assert!(!p.microphone_enabled);
        assert_eq!(p.display_name, "Alice");
        assert_eq!(p.role, ParticipantRole::Moderator);
    }

    #[test]
    fn update_unknown_identity_is_noop() {
        let mut roster = ParticipantRoster::new();
        assert!(!roster.set_mic_on("ghost", true));
        assert!(!roster.set_nickname("ghost", "Boo"));
        assert!(roster.is_empty());
    }

    #[test]
    fn set_drops_duplicate_identities() {
        let mut roster = ParticipantRoster::new();
        roster.add(make_participant("old", "Stale"));
        roster.set(vec![
            make_participant("s1", "Alice"),
            make_participant("s2", "Bob"),
            make_participant("s1", "Alice again"),
        ]);
        assert_eq!(roster.len(), 2);
        assert!(!roster.contains("old"));
        assert_eq!(roster.participant("s1").unwrap().display_name, "Alice");
    }

    #[test]
    fn local_and_owner_lookup() {
        let mut roster = ParticipantRoster::new();
        let mut me = make_participant("me", "Me");
        me.is_local_user = true;
        let mut host = make_participant("host", "Host");
        host.role = ParticipantRole::Owner;
        roster.add(me);
        roster.add(host);

        assert_eq!(roster.local_participant().unwrap().identity, "me");
        assert_eq!(roster.owner().unwrap().identity, "host");
    }

    #[test]
    fn replay_matches_plain_map() {
        enum Op {
            Add(&'static str, &'static str),
            Remove(&'static str),
            Rename(&'static str, &'static str),
        }
        let ops = [
            Op::Add("a", "A"),
            Op::Add("b", "B"),
            Op::Add("a", "A2"),
            Op::Rename("b", "Bee"),
            Op::Remove("a"),
            Op::Rename("a", "ghost"),
            Op::Add("c", "C"),
            Op::Add("a", "A3"),
            Op::Remove("zzz"),
        ];

        let mut roster = ParticipantRoster::new();
        let mut model: HashMap<&str, &str> = HashMap::new();
        for op in &ops {
            match *op {
                Op::Add(id, name) => {
                    roster.add(make_participant(id, name));
                    model.entry(id).or_insert(name);
                }
                Op::Remove(id) => {
                    roster.remove(id);
                    model.remove(id);
                }
                Op::Rename(id, name) => {
                    roster.set_nickname(id, name);
                    if let Some(v) = model.get_mut(id) {
                        *v = name;
                    }
                }
            }
        }

        assert_eq!(roster.len(), model.len());
        for (id, name) in model {
            assert_eq!(roster.participant(id).unwrap().display_name, name);
        }
    }

    #[test]
    fn join_mute_leave_scenario() {
        let (store, _) = store_with_capture();
        assert!(store.is_empty());

        store.add(Participant {
            role: ParticipantRole::Guest,
            ..make_participant("s1", "Alice")
        });
        assert_eq!(store.len(), 1);
        let before = store.participant("s1").unwrap();

        store.set_mic_on("s1", true);
        let after = store.participant("s1").unwrap();
        assert!(after.microphone_enabled);
        assert_eq!(
            after,
            Participant { microphone_enabled: true, ..before }
        );

        store.remove("s1");
        assert!(store.is_empty());
    }

    #[test]
    fn store_emits_one_event_per_effective_change() {
        let (store, events) = store_with_capture();
        store.add(make_participant("s1", "Alice"));
        store.add(make_participant("s1", "Alice"));
        store.set_camera_on("s1", true);
        store.set_camera_on("s1", true);
        store.remove("s1");
        store.remove("s1");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StudyRoomEvent::ParticipantJoined(_)));
        match &events[1] {
            StudyRoomEvent::ParticipantUpdated(p) => assert!(p.camera_enabled),
            other => panic!("expected ParticipantUpdated, got {other:?}"),
        }
        assert_eq!(events[2], StudyRoomEvent::ParticipantLeft("s1".to_string()));
    }

    #[test]
    fn reset_clears_and_emits() {
        let (store, events) = store_with_capture();
        store.add(make_participant("s1", "Alice"));
        store.add(make_participant("s2", "Bob"));
        store.reset();

        assert!(store.is_empty());
        assert_eq!(events.lock().unwrap().last(), Some(&StudyRoomEvent::RosterReset));
    }

    #[test]
    fn role_attribute_parsing() {
        assert_eq!(ParticipantRole::from_attribute("owner"), ParticipantRole::Owner);
        assert_eq!(ParticipantRole::from_attribute(" Moderator "), ParticipantRole::Moderator);
        assert_eq!(ParticipantRole::from_attribute("guest"), ParticipantRole::Guest);
        assert_eq!(ParticipantRole::from_attribute(""), ParticipantRole::Guest);
    }
}
