// std
use std::{
	env,
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};
// crates.io
use time::{Duration, macros};
// self
use session_broker::{
	auth::{SubjectId, TokenId, TokenKind},
	clock::ManualClock,
	store::{
		BatchReply, CompareAndSwapOutcome, FileStore, MemoryStore, RevocationStore, SessionStore,
		StoreBatch, StoreKey,
	},
};

fn clock() -> Arc<ManualClock> {
	Arc::new(ManualClock::new(macros::datetime!(2025-11-10 12:00 UTC)))
}

fn alice() -> SubjectId {
	SubjectId::new("alice").expect("Subject fixture should be valid.")
}

fn temp_path(label: &str) -> std::path::PathBuf {
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System clock should be after the Unix epoch.")
		.as_nanos();

	env::temp_dir().join(format!("session-broker-{label}-{}-{nanos}.json", std::process::id()))
}

async fn exercise(store: Arc<dyn SessionStore>, clock: Arc<ManualClock>) {
	let marker = StoreKey::RefreshMarker { subject: alice() };

	assert!(
		store
			.set_if_absent(&marker, "jti-1".into(), Duration::minutes(5))
			.await
			.expect("First write should succeed.")
	);
	assert!(
		!store
			.set_if_absent(&marker, "jti-2".into(), Duration::minutes(5))
			.await
			.expect("Second write should run.")
	);
	assert_eq!(
		store
			.compare_and_swap(&marker, "jti-9", "jti-3".into(), Duration::minutes(5))
			.await
			.expect("Swap should run."),
		CompareAndSwapOutcome::Mismatch
	);
	assert_eq!(
		store
			.compare_and_swap(&marker, "jti-1", "jti-3".into(), Duration::minutes(5))
			.await
			.expect("Swap should run."),
		CompareAndSwapOutcome::Updated
	);

	let window = StoreKey::RateWindow { subject: alice(), bucket: 7 };
	let replies = store
		.execute(
			StoreBatch::new()
				.increment(window.clone())
				.increment(window.clone())
				.expire(window.clone(), Duration::minutes(1))
				.delete(StoreKey::RefreshMarker {
					subject: SubjectId::new("nobody").expect("Subject fixture should be valid."),
				}),
		)
		.await
		.expect("Batch should apply.");

	assert_eq!(
		replies,
		[BatchReply::Integer(1), BatchReply::Integer(2), BatchReply::Bool(true), BatchReply::Bool(false)]
	);

	clock.advance(Duration::minutes(1));

	assert_eq!(store.get(&window).await.expect("Lookup should succeed."), None);
	assert_eq!(store.get(&marker).await.expect("Lookup should succeed."), Some("jti-3".into()));

	clock.advance(Duration::minutes(4));

	assert_eq!(
		store
			.compare_and_swap(&marker, "jti-3", "jti-4".into(), Duration::minutes(5))
			.await
			.expect("Swap should run."),
		CompareAndSwapOutcome::Missing
	);
}

#[tokio::test]
async fn memory_store_honors_the_store_contract() {
	let clock = clock();

	exercise(Arc::new(MemoryStore::with_clock(clock.clone())), clock).await;
}

#[tokio::test]
async fn file_store_honors_the_store_contract() {
	let clock = clock();
	let path = temp_path("contract");
	let store = FileStore::open(&path).expect("File store should open.").with_clock(clock.clone());

	exercise(Arc::new(store), clock).await;

	let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn revocations_survive_a_file_store_restart() {
	let clock = clock();
	let path = temp_path("restart");
	let token = TokenId::new("jti-1").expect("Token id fixture should be valid.");
	let first: Arc<dyn SessionStore> =
		Arc::new(FileStore::open(&path).expect("File store should open.").with_clock(clock.clone()));

	RevocationStore::new(first, Duration::seconds(2))
		.revoke(TokenKind::Access, &alice(), &token, Duration::minutes(15))
		.await
		.expect("Revoke should persist.");

	let reopened: Arc<dyn SessionStore> =
		Arc::new(FileStore::open(&path).expect("File store should reopen.").with_clock(clock.clone()));
	let revocations = RevocationStore::new(reopened, Duration::seconds(2));

	assert!(
		revocations
			.is_revoked(TokenKind::Access, &alice(), &token)
			.await
			.expect("Lookup should succeed.")
	);

	clock.advance(Duration::minutes(15));

	assert!(
		!revocations
			.is_revoked(TokenKind::Access, &alice(), &token)
			.await
			.expect("Lookup should succeed.")
	);

	let _ = std::fs::remove_file(path);
}
