mod common;

use common::{bob_and_alice, Address, Post, PostStatus, Profile, User, UserStatus};
use modelstore_core::{Changes, Criteria, Entity, EntityRepository, JsonRepository, RepoError};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn read_document(dir: &TempDir, type_name: &str) -> Vec<Value> {
    let raw = fs::read_to_string(dir.path().join(format!("{type_name}.json"))).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn open_creates_folder_and_empty_document() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("nested").join("json");

    let repo = JsonRepository::<User>::open(&folder).unwrap();

    assert_eq!(repo.path(), folder.join("User.json"));
    assert_eq!(fs::read_to_string(repo.path()).unwrap().trim(), "[]");
    assert!(repo.all().unwrap().is_empty());
}

#[test]
fn saved_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let (bob, alice) = bob_and_alice();

    let repo = JsonRepository::<User>::open(dir.path()).unwrap();
    repo.add(vec![bob.clone(), alice.clone()]).unwrap();
    repo.save().unwrap();
    drop(repo);

    let reopened = JsonRepository::<User>::open(dir.path()).unwrap();
    assert_eq!(reopened.all().unwrap(), vec![bob, alice]);
}

#[test]
fn document_stores_enum_values_and_public_id() {
    let dir = TempDir::new().unwrap();
    let user = User::new("bob", "111", UserStatus::Banned);

    let repo = JsonRepository::<User>::open(dir.path()).unwrap();
    repo.add(vec![user.clone()]).unwrap();
    repo.save().unwrap();

    let document = read_document(&dir, "User");
    assert_eq!(document.len(), 1);
    assert_eq!(document[0]["status"], Value::from(2));
    assert_eq!(document[0]["id"], Value::from(user.id().as_str()));
}

#[test]
fn unsaved_mutations_stay_in_memory() {
    let dir = TempDir::new().unwrap();
    let (bob, alice) = bob_and_alice();

    let repo = JsonRepository::<User>::open(dir.path()).unwrap();
    repo.add(vec![bob]).unwrap();
    repo.save().unwrap();

    repo.add(vec![alice]).unwrap();
    repo.delete(&Criteria::by("name", "bob")).unwrap();

    assert_eq!(repo.count(&Criteria::new()).unwrap(), 1);
    let document = read_document(&dir, "User");
    assert_eq!(document.len(), 1);
    assert_eq!(document[0]["name"], Value::from("bob"));
}

#[test]
fn reload_discards_unsaved_mutations() {
    let dir = TempDir::new().unwrap();
    let (bob, alice) = bob_and_alice();

    let repo = JsonRepository::<User>::open(dir.path()).unwrap();
    repo.add(vec![bob.clone()]).unwrap();
    repo.save().unwrap();
    repo.add(vec![alice]).unwrap();

    repo.reload().unwrap();
    assert_eq!(repo.all().unwrap(), vec![bob]);
}

#[test]
fn enum_criteria_match_by_member_value_or_name() {
    let dir = TempDir::new().unwrap();
    let (bob, alice) = bob_and_alice();
    let repo = JsonRepository::<User>::open(dir.path()).unwrap();
    repo.add(vec![bob, alice.clone()]).unwrap();

    let by_member = repo.get(&Criteria::by("status", UserStatus::Confirmed)).unwrap();
    let by_value = repo.get(&Criteria::by("status", 1)).unwrap();
    let by_name = repo.get(&Criteria::by("status", "confirmed")).unwrap();

    assert_eq!(by_member, vec![alice.clone()]);
    assert_eq!(by_value, vec![alice.clone()]);
    assert_eq!(by_name, vec![alice]);
}

#[test]
fn update_can_change_a_field_used_in_criteria() {
    let dir = TempDir::new().unwrap();
    let (bob, alice) = bob_and_alice();
    let repo = JsonRepository::<User>::open(dir.path()).unwrap();
    repo.add(vec![bob, alice]).unwrap();

    let updated = repo
        .update(
            &Criteria::by("status", UserStatus::Created),
            &Changes::new().set("status", UserStatus::Banned),
        )
        .unwrap();

    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].name, "bob");
    assert_eq!(updated[0].status, UserStatus::Banned);
    assert_eq!(repo.count(&Criteria::by("status", "Banned")).unwrap(), 1);
}

#[test]
fn nested_and_list_fields_persist_as_json() {
    let dir = TempDir::new().unwrap();
    let mut profile = Profile::new("ann");
    profile.verified = true;
    profile.home = Some(Address::new("Oslo", "0150"));
    let mut post = Post::new("hello", PostStatus::Published);
    post.tags = vec!["rust".to_string()];

    let profiles = JsonRepository::<Profile>::open(dir.path()).unwrap();
    let posts = JsonRepository::<Post>::open(dir.path()).unwrap();
    profiles.add(vec![profile.clone()]).unwrap();
    posts.add(vec![post.clone()]).unwrap();
    profiles.save().unwrap();
    posts.save().unwrap();

    let document = read_document(&dir, "Profile");
    assert_eq!(document[0]["home"]["city"], Value::from("Oslo"));
    let document = read_document(&dir, "Post");
    assert_eq!(document[0]["status"], Value::from("published"));

    let profiles = JsonRepository::<Profile>::open(dir.path()).unwrap();
    let posts = JsonRepository::<Post>::open(dir.path()).unwrap();
    assert_eq!(profiles.all().unwrap(), vec![profile]);
    assert_eq!(posts.all().unwrap(), vec![post]);
}

#[test]
fn corrupt_document_fails_to_open() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("User.json"), "{ not json").unwrap();

    let err = JsonRepository::<User>::open(dir.path()).err().unwrap();
    assert!(matches!(err, RepoError::Document { .. }));
}

#[test]
fn records_that_do_not_fit_the_entity_fail_to_open() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("User.json"),
        r#"[{"id": "u-1", "name": "bob", "password": "1", "status": 9}]"#,
    )
    .unwrap();

    let err = JsonRepository::<User>::open(dir.path()).err().unwrap();
    assert!(matches!(err, RepoError::Serialization(_)));
}

#[test]
fn unknown_criteria_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let repo = JsonRepository::<User>::open(dir.path()).unwrap();

    let err = repo.get(&Criteria::by("email", "b@x")).unwrap_err();
    assert!(matches!(err, RepoError::InvalidCriteria { .. }));
}
