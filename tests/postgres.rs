//! Store tests against a real database. Run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use chrono::NaiveDate;
use dotenv::dotenv;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use todone::classifier::Classification;
use todone::models::{
    generate_forward_email, welcome_tasks, NewAccount, NewAttachment, NewEmail, NewTask,
    TaskPriority, TaskUpdate,
};
use todone::store::{AccountStore, JobQueue, MailStore, PgStore, StoreError, TaskStore};

async fn store() -> PgStore {
    dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let store = PgStore::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    store.migrate().await.expect("Failed to run migrations");
    store
}

async fn account(store: &PgStore, seed: Vec<NewTask>) -> i32 {
    let forward_email = generate_forward_email("todone.test");
    store
        .create_account(
            NewAccount {
                email: format!("{}@example.com", uuid::Uuid::new_v4().simple()),
                password_hash: "hash".to_string(),
                forward_email,
            },
            seed,
        )
        .await
        .unwrap()
        .id
}

async fn cleanup(store: &PgStore, owner: i32) {
    let _ = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(owner)
        .execute(store.pool())
        .await;
}

fn task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        summary: None,
        priority: TaskPriority::Medium,
        deadline: None,
        email_id: None,
    }
}

#[ignore]
#[actix_rt::test]
async fn test_registration_seeds_and_rejects_duplicates() {
    let store = store().await;
    let owner = account(&store, welcome_tasks()).await;

    let todos = store.list_tasks(owner).await.unwrap();
    let positions: Vec<i32> = todos.iter().map(|t| t.task.order_index).collect();
    assert_eq!(positions, vec![1, 2, 3]);

    let existing = store.find_account(owner).await.unwrap().unwrap();
    let duplicate = store
        .create_account(
            NewAccount {
                email: existing.email.clone(),
                password_hash: "hash".to_string(),
                forward_email: generate_forward_email("todone.test"),
            },
            welcome_tasks(),
        )
        .await;
    assert!(matches!(duplicate, Err(StoreError::Duplicate("account"))));

    let resolved = store
        .resolve_alias(&existing.forward_email.to_uppercase())
        .await
        .unwrap();
    assert_eq!(resolved, Some(owner));

    cleanup(&store, owner).await;
}

#[ignore]
#[actix_rt::test]
async fn test_concurrent_appends_get_distinct_positions() {
    let store = Arc::new(store().await);
    let owner = account(&store, Vec::new()).await;
    assert_eq!(store.next_order_index(owner).await.unwrap(), 1);

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .append_task(owner, task(&format!("task {}", i)))
                    .await
                    .unwrap()
                    .order_index
            })
        })
        .collect();
    let mut positions = Vec::new();
    for handle in handles {
        positions.push(handle.await.unwrap());
    }
    positions.sort_unstable();
    assert_eq!(positions, (1..=10).collect::<Vec<_>>());

    cleanup(&store, owner).await;
}

#[ignore]
#[actix_rt::test]
async fn test_edit_delete_and_partial_reorder() {
    let store = store().await;
    let owner = account(&store, Vec::new()).await;
    let other = account(&store, Vec::new()).await;

    let a = store.append_task(owner, task("a")).await.unwrap();
    let b = store.append_task(owner, task("b")).await.unwrap();
    let c = store.append_task(owner, task("c")).await.unwrap();

    let update = TaskUpdate {
        title: "c, edited".to_string(),
        summary: Some("notes".to_string()),
        priority: None,
        deadline: NaiveDate::from_ymd_opt(2024, 5, 1),
        completed: true,
        order_index: None,
    };
    assert!(!store.update_task(other, c.id, &update).await.unwrap());
    assert!(store.update_task(owner, c.id, &update).await.unwrap());
    let edited = store.find_task(owner, c.id).await.unwrap().unwrap();
    assert_eq!(edited.title, "c, edited");
    assert_eq!(edited.order_index, 3);
    assert!(edited.completed);

    store.reorder_tasks(owner, &[c.id, a.id]).await.unwrap();
    let order: Vec<(i32, i32)> = store
        .list_tasks(owner)
        .await
        .unwrap()
        .iter()
        .map(|t| (t.task.id, t.task.order_index))
        .collect();
    assert_eq!(order, vec![(c.id, 1), (a.id, 2), (b.id, 3)]);

    assert!(!store.delete_task(other, b.id).await.unwrap());
    assert!(store.delete_task(owner, b.id).await.unwrap());

    cleanup(&store, owner).await;
    cleanup(&store, other).await;
}

#[ignore]
#[actix_rt::test]
async fn test_outbox_lifecycle() {
    let store = store().await;
    let owner = account(&store, Vec::new()).await;

    let email_id = store
        .insert_email(
            NewEmail {
                user_id: owner,
                from_email: "landlord@example.com".to_string(),
                subject: "Pay rent".to_string(),
                body: String::new(),
                html_body: Some("<p>Rent due</p>".to_string()),
            },
            vec![NewAttachment {
                filename: "lease.pdf".to_string(),
                filepath: "1-abc-lease.pdf".to_string(),
                mimetype: "application/pdf".to_string(),
            }],
        )
        .await
        .unwrap();

    let detail = store.find_email(owner, email_id).await.unwrap().unwrap();
    assert_eq!(detail.attachments.len(), 1);

    // Other tests may leave jobs behind; only look at ours.
    let job = store
        .claim_jobs(100, 5)
        .await
        .unwrap()
        .into_iter()
        .find(|job| job.email_id == email_id)
        .unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.body, "<p>Rent due</p>");
    assert_eq!(job.classification, None);

    let classification = Classification::fallback("Pay rent");
    store.save_classification(job.id, &classification).await.unwrap();
    store
        .fail_job(&job, "boom", 5, Duration::from_secs(3600))
        .await
        .unwrap();
    // Not due yet
    assert!(store
        .claim_jobs(100, 5)
        .await
        .unwrap()
        .iter()
        .all(|claimed| claimed.email_id != email_id));

    sqlx::query("UPDATE ingest_jobs SET available_at = NOW() WHERE id = $1")
        .bind(job.id)
        .execute(store.pool())
        .await
        .unwrap();
    let retry = store
        .claim_jobs(100, 5)
        .await
        .unwrap()
        .into_iter()
        .find(|job| job.email_id == email_id)
        .unwrap();
    assert_eq!(retry.attempts, 2);
    assert_eq!(retry.classification, Some(classification));

    let pay_rent = || NewTask {
        email_id: Some(email_id),
        ..task("Pay rent")
    };
    // The first claim was superseded by the retry
    assert_eq!(store.complete_job(&job, pay_rent()).await.unwrap(), None);
    let created = store.complete_job(&retry, pay_rent()).await.unwrap().unwrap();
    assert_eq!(created.order_index, 1);
    assert_eq!(store.complete_job(&retry, pay_rent()).await.unwrap(), None);

    let todos = store.list_tasks(owner).await.unwrap();
    assert_eq!(todos[0].email_subject.as_deref(), Some("Pay rent"));
    assert_eq!(todos[0].from_email.as_deref(), Some("landlord@example.com"));

    cleanup(&store, owner).await;
}
