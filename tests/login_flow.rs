mod common;

use modelstack::auth::DEFAULT_ROLE;
use modelstack::error::ErrorBody;
use async_trait::async_trait;
use modelstack::value::doc;
use modelstack::{AppError, Datasource, Filter, MemoryDatasource, Value, M};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Memory store whose reads of one collection can be made to fail.
struct Flaky {
    inner: MemoryDatasource,
    failing: Mutex<Option<&'static str>>,
}

impl Flaky {
    fn fail_reads_of(&self, collection: &'static str) {
        *self.failing.lock().unwrap() = Some(collection);
    }
}

#[async_trait]
impl Datasource for Flaky {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<M>, AppError> {
        if *self.failing.lock().unwrap() == Some(collection) {
            return Err(AppError::Datasource("connection reset".into()));
        }
        self.inner.find_many(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AppError> {
        self.inner.count(collection, filter).await
    }

    async fn create(&self, collection: &str, data: M) -> Result<M, AppError> {
        self.inner.create(collection, data).await
    }

    async fn update_by_id(&self, collection: &str, id: &Value, data: &M) -> Result<Option<M>, AppError> {
        self.inner.update_by_id(collection, id, data).await
    }

    async fn delete_by_id(&self, collection: &str, id: &Value) -> Result<u64, AppError> {
        self.inner.delete_by_id(collection, id).await
    }
}

async fn login(rt: &modelstack::Runtime, body: serde_json::Value) -> Result<serde_json::Value, AppError> {
    let account = rt.model("Account")?.clone();
    let mut ctx = rt.context().with_data(doc(body));
    account.trigger("login", &mut ctx).await?;
    Ok(ctx.result.unwrap_or_default())
}

fn failure_bytes(err: &AppError) -> Vec<u8> {
    serde_json::to_vec(&ErrorBody::from_error(err)).unwrap()
}

#[tokio::test]
async fn created_password_is_hashed() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = common::runtime(&tmp);
    let account = rt.model("Account").unwrap().clone();
    let ctx = rt.context();

    let user = account
        .create(doc(json!({ "email": "ada@example.com", "password": "pw-123" })), &ctx)
        .await
        .unwrap();
    let stored = user.get_string("password");
    assert_ne!(stored, "pw-123");
    assert!(rt.hasher.verify("pw-123", &stored).unwrap());
    assert!(matches!(user.data().get("created"), Some(Value::DateTime(_))));
}

#[tokio::test]
async fn email_and_password_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = common::runtime(&tmp);
    let account = rt.model("Account").unwrap().clone();
    let ctx = rt.context();

    let err = account.create(doc(json!({ "password": "x" })), &ctx).await.unwrap_err();
    assert_eq!(err.status_and_code().1, "EMAIL_PRESENCE");

    let err = account
        .create(doc(json!({ "email": "  ", "password": "x" })), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.status_and_code().1, "EMAIL_PRESENCE");

    let err = account
        .create(doc(json!({ "email": "a@b.c", "password": "   " })), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.status_and_code().1, "PASSWORD_BLANK");
    assert_eq!(account.count(None, &ctx).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_email_and_username_conflict_before_write() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = common::runtime(&tmp);
    let account = rt.model("Account").unwrap().clone();
    let ctx = rt.context();

    account
        .create(doc(json!({ "email": "ada@example.com", "username": "ada", "password": "pw" })), &ctx)
        .await
        .unwrap();

    let err = account
        .create(doc(json!({ "email": "ada@example.com", "password": "pw" })), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { code: "EMAIL_UNIQUENESS", .. }));

    let err = account
        .create(doc(json!({ "email": "ADA@example.com", "password": "pw" })), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { code: "EMAIL_UNIQUENESS", .. }));

    let err = account
        .create(doc(json!({ "email": "other@example.com", "username": "ada", "password": "pw" })), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { code: "USERNAME_UNIQUENESS", .. }));

    assert_eq!(account.count(None, &ctx).await.unwrap(), 1);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = common::runtime(&tmp);
    let account = rt.model("Account").unwrap().clone();
    account
        .create(doc(json!({ "email": "ada@example.com", "password": "right" })), &rt.context())
        .await
        .unwrap();

    for body in [
        json!({ "password": "right" }),
        json!({ "email": "ada@example.com" }),
        json!({ "email": "", "password": "right" }),
        json!({ "email": "ada@example.com", "password": "  " }),
    ] {
        assert!(matches!(login(&rt, body).await, Err(AppError::LoginFailed)));
    }

    let unknown = login(&rt, json!({ "email": "nobody@example.com", "password": "right" }))
        .await
        .unwrap_err();
    let wrong = login(&rt, json!({ "email": "ada@example.com", "password": "wrong" }))
        .await
        .unwrap_err();
    assert_eq!(failure_bytes(&unknown), failure_bytes(&wrong));
}

#[tokio::test]
async fn login_signs_claims_with_aggregated_roles() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = common::runtime(&tmp);
    let ctx = rt.context();
    let account = rt.model("Account").unwrap().clone();
    let role = rt.model("Role").unwrap().clone();
    let mapping = rt.model("RoleMapping").unwrap().clone();

    let user = account
        .create(doc(json!({ "email": "ada@example.com", "password": "right" })), &ctx)
        .await
        .unwrap();
    let hex = user.id().id_string();
    let admin = role.create(doc(json!({ "name": "admin" })), &ctx).await.unwrap();
    let editor = role.create(doc(json!({ "name": "editor" })), &ctx).await.unwrap();

    // typed principal id (converted on create)
    mapping
        .create(
            doc(json!({ "principalType": "USER", "principalId": hex, "roleId": admin.id().id_string() })),
            &ctx,
        )
        .await
        .unwrap();
    // string principal id
    let raw = ctx.child().without_type_conversions();
    let mut data = doc(json!({ "principalType": "USER", "principalId": hex }));
    data.insert("roleId".into(), editor.id().clone());
    mapping.create(data, &raw).await.unwrap();

    let result = login(&rt, json!({ "email": "ada@example.com", "password": "right" }))
        .await
        .unwrap();
    assert_eq!(result["userId"], json!(hex));
    let token = result["id"].as_str().unwrap();
    let claims = rt.signer.verify(token).unwrap();
    assert_eq!(claims.user_id, hex);
    assert_eq!(claims.ttl, 604_800 * 2 * 1000);
    assert_eq!(claims.roles[0], DEFAULT_ROLE);
    assert!(claims.roles.contains(&"admin".to_string()));
    assert!(claims.roles.contains(&"editor".to_string()));
}

#[tokio::test]
async fn storage_errors_during_login_read_as_login_failed() {
    for collection in ["Account", "RoleMapping"] {
        let tmp = tempfile::tempdir().unwrap();
        let ds = Arc::new(Flaky {
            inner: MemoryDatasource::new("db"),
            failing: Mutex::new(None),
        });
        let rt = common::runtime_with(ds.clone(), &tmp);
        let account = rt.model("Account").unwrap().clone();
        account
            .create(doc(json!({ "email": "ada@example.com", "password": "right" })), &rt.context())
            .await
            .unwrap();

        ds.fail_reads_of(collection);
        let err = login(&rt, json!({ "email": "ada@example.com", "password": "right" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LoginFailed), "{}: {:?}", collection, err);
        assert_eq!(err.status_and_code().1, "LOGIN_FAILED");
    }
}

#[tokio::test]
async fn email_is_stored_trimmed_so_padding_cannot_dodge_uniqueness() {
    let tmp = tempfile::tempdir().unwrap();
    let rt = common::runtime(&tmp);
    let account = rt.model("Account").unwrap().clone();
    let ctx = rt.context();

    let first = account
        .create(doc(json!({ "email": " ada@example.com ", "password": "pw" })), &ctx)
        .await
        .unwrap();
    assert_eq!(first.get_string("email"), "ada@example.com");

    let err = account
        .create(doc(json!({ "email": "ada@example.com", "password": "pw" })), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { code: "EMAIL_UNIQUENESS", .. }));
    assert_eq!(account.count(None, &ctx).await.unwrap(), 1);

    // padded login input finds the trimmed record
    let result = login(&rt, json!({ "email": "  ada@example.com", "password": "pw" }))
        .await
        .unwrap();
    assert_eq!(result["userId"], json!(first.id().id_string()));
}
