use super::*;
use crate::user::UserDirectory;
use rand::rngs::mock::StepRng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

struct Fixture {
    store: Arc<Store>,
    users: UserDirectory,
    registry: EventRegistry,
}

fn fixture() -> Fixture {
    fixture_with(CodeGenerator::with_rng(StdRng::seed_from_u64(11), 32))
}

fn fixture_with(codes: CodeGenerator) -> Fixture {
    let store = Arc::new(Store::new(":memory:").expect("in-memory store failed"));
    Fixture {
        users: UserDirectory::new(Arc::clone(&store)),
        registry: EventRegistry::new(Arc::clone(&store), codes),
        store,
    }
}

fn standup() -> NewEvent {
    NewEvent {
        title: "Standup".to_string(),
        description: "Daily sync".to_string(),
        event_date_time: None,
        location: None,
        is_online: true,
    }
}

#[test]
fn test_create_event_assigns_well_formed_code() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();

    let event = f.registry.create_event(standup(), &host).unwrap();

    assert!(code::is_well_formed(&event.event_code));
    assert_eq!(event.title, "Standup");
    assert_eq!(event.host_id, host.id);
    assert!(event.is_online);
}

#[test]
fn test_created_codes_are_unique() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();

    let codes: HashSet<String> = (0..200)
        .map(|_| f.registry.create_event(standup(), &host).unwrap().event_code)
        .collect();

    assert_eq!(codes.len(), 200);
}

#[test]
fn test_create_event_retries_after_collision() {
    let f = fixture_with(CodeGenerator::with_rng(StdRng::seed_from_u64(5), 8));
    let host = f.users.login_or_register("a@x.com").unwrap();
    let first = f.registry.create_event(standup(), &host).unwrap();

    // Same seed replays the first candidate, which is now taken
    let replay = EventRegistry::new(
        Arc::clone(&f.store),
        CodeGenerator::with_rng(StdRng::seed_from_u64(5), 8),
    );
    let second = replay.create_event(standup(), &host).unwrap();

    assert_ne!(first.event_code, second.event_code);
    assert!(code::is_well_formed(&second.event_code));
}

#[test]
fn test_code_claimed_between_check_and_insert_is_retried() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let rival = f.users.login_or_register("r@x.com").unwrap();
    let new = standup();

    // A rival creator takes the first candidate right after it passed the check
    let mut first: Option<String> = None;
    let mut rival_event: Option<Event> = None;
    let event = f
        .registry
        .codes
        .generate(|candidate| {
            if f.registry.code_taken(candidate)? {
                return Ok(None);
            }
            if first.is_none() {
                first = Some(candidate.to_string());
                rival_event = f.store.insert_event(&standup(), candidate, rival.id)?;
            }
            f.registry.claim_code(&new, candidate, host.id)
        })
        .unwrap();

    let first = first.unwrap();
    let rival_event = rival_event.unwrap();
    assert_eq!(rival_event.event_code, first);
    assert_eq!(rival_event.host_id, rival.id);
    assert_ne!(event.event_code, first);
    assert_eq!(event.host_id, host.id);
    assert_eq!(f.registry.hosted_events(&host).unwrap(), vec![event]);
    assert_eq!(f.registry.hosted_events(&rival).unwrap(), vec![rival_event]);
}

#[test]
fn test_create_event_fails_when_code_space_exhausted() {
    let f = fixture_with(CodeGenerator::with_rng(StepRng::new(0, 0), 4));
    let host = f.users.login_or_register("a@x.com").unwrap();

    f.registry.create_event(standup(), &host).unwrap();
    let result = f.registry.create_event(standup(), &host);

    assert!(matches!(
        result,
        Err(RegistryError::CodeSpaceExhausted { attempts: 4 })
    ));
    assert_eq!(f.registry.hosted_events(&host).unwrap().len(), 1);
}

#[test]
fn test_register_with_unknown_code() {
    let f = fixture();
    let user = f.users.login_or_register("b@x.com").unwrap();

    assert!(matches!(
        f.registry.register_for_event("EVT-NONE", &user),
        Err(RegistryError::InvalidCode)
    ));
    assert!(matches!(
        f.registry.register_for_event("not-a-code", &user),
        Err(RegistryError::InvalidCode)
    ));
    assert!(f.registry.attending_events(&user).unwrap().is_empty());
}

#[test]
fn test_host_cannot_register_for_own_event() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let event = f.registry.create_event(standup(), &host).unwrap();

    let result = f.registry.register_for_event(&event.event_code, &host);

    assert!(matches!(result, Err(RegistryError::OwnEvent)));
    assert!(f.registry.event_attendees(event.id).unwrap().is_empty());
}

#[test]
fn test_duplicate_registration_rejected() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let guest = f.users.login_or_register("b@x.com").unwrap();
    let event = f.registry.create_event(standup(), &host).unwrap();

    let joined = f.registry.register_for_event(&event.event_code, &guest).unwrap();
    assert_eq!(joined.id, event.id);

    let again = f.registry.register_for_event(&event.event_code, &guest);
    assert!(matches!(again, Err(RegistryError::AlreadyRegistered)));
    assert_eq!(f.registry.event_attendees(event.id).unwrap().len(), 1);
}

#[test]
fn test_concurrent_duplicate_registrations_persist_once() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let guest = f.users.login_or_register("b@x.com").unwrap();
    let event = f.registry.create_event(standup(), &host).unwrap();

    let results: Vec<Result<Event, RegistryError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| f.registry.register_for_event(&event.event_code, &guest)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(RegistryError::AlreadyRegistered)))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(f.registry.event_attendees(event.id).unwrap().len(), 1);
}

#[test]
fn test_error_messages() {
    assert_eq!(RegistryError::InvalidCode.to_string(), "Invalid event code");
    assert_eq!(
        RegistryError::OwnEvent.to_string(),
        "You cannot register for your own event"
    );
    assert_eq!(
        RegistryError::AlreadyRegistered.to_string(),
        "You are already registered for this event"
    );
    assert_eq!(RegistryError::EventNotFound.to_string(), "Event not found");
}

#[test]
fn test_hosted_events_only_include_own() {
    let f = fixture();
    let a = f.users.login_or_register("a@x.com").unwrap();
    let b = f.users.login_or_register("b@x.com").unwrap();
    let a1 = f.registry.create_event(standup(), &a).unwrap();
    f.registry.create_event(standup(), &b).unwrap();
    let a2 = f.registry.create_event(standup(), &a).unwrap();

    let ids: Vec<EventId> = f
        .registry
        .hosted_events(&a)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();

    assert_eq!(ids, vec![a1.id, a2.id]);
}

#[test]
fn test_attending_events_follow_registrations() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let guest = f.users.login_or_register("b@x.com").unwrap();
    let joined = f.registry.create_event(standup(), &host).unwrap();
    f.registry.create_event(standup(), &host).unwrap();

    f.registry.register_for_event(&joined.event_code, &guest).unwrap();

    let attending = f.registry.attending_events(&guest).unwrap();
    assert_eq!(attending.len(), 1);
    assert_eq!(attending[0].id, joined.id);
    assert!(f.registry.attending_events(&host).unwrap().is_empty());
}

#[test]
fn test_delete_event_cascades() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let guest = f.users.login_or_register("b@x.com").unwrap();
    let event = f.registry.create_event(standup(), &host).unwrap();
    f.registry.register_for_event(&event.event_code, &guest).unwrap();

    f.registry.delete_event(event.id).unwrap();

    assert!(f.registry.find_event(event.id).unwrap().is_none());
    assert!(f.registry.attending_events(&guest).unwrap().is_empty());
    assert!(matches!(
        f.registry.event_attendees(event.id),
        Err(RegistryError::EventNotFound)
    ));
    assert!(matches!(
        f.registry.delete_event(event.id),
        Err(RegistryError::EventNotFound)
    ));
    assert!(matches!(
        f.registry.register_for_event(&event.event_code, &guest),
        Err(RegistryError::InvalidCode)
    ));
}

#[test]
fn test_event_attendees_projection() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let guest = f.users.login_or_register("b@x.com").unwrap();
    let event = f.registry.create_event(standup(), &host).unwrap();
    f.registry.register_for_event(&event.event_code, &guest).unwrap();

    let attendees = f.registry.event_attendees(event.id).unwrap();

    assert_eq!(attendees.len(), 1);
    assert_eq!(attendees[0].email, "b@x.com");
    assert_eq!(attendees[0].name, None);

    let json = serde_json::to_value(&attendees[0]).unwrap();
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 3);
    assert!(json.get("registeredAt").is_some());
}

#[test]
fn test_event_json_shape() {
    let f = fixture();
    let host = f.users.login_or_register("a@x.com").unwrap();
    let event = f.registry.create_event(standup(), &host).unwrap();

    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(json["eventCode"], event.event_code.as_str());
    assert_eq!(json["hostId"], host.id.0);
    assert_eq!(json["isOnline"], true);
    assert!(json["eventDateTime"].is_null());
}
