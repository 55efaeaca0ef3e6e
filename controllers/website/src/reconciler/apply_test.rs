//! Unit tests for the apply engine

#[cfg(test)]
mod tests {
    use crate::reconciler::apply::{Applied, apply_or_create, set_owner_reference};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use resource_store::{MockStore, StoreError};
    use std::collections::BTreeMap;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "web.microscaler.io/v1alpha1".to_string(),
            kind: "Website".to_string(),
            name: "demo".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn set_content(content: &'static str) -> impl Fn(&mut ConfigMap) + Send + Sync {
        move |cm: &mut ConfigMap| {
            cm.data
                .get_or_insert_with(BTreeMap::new)
                .insert("index.html".to_string(), content.to_string());
        }
    }

    async fn apply(
        store: &MockStore<ConfigMap>,
        owner_uid: &str,
        content: &'static str,
    ) -> Result<Applied<ConfigMap>, StoreError> {
        apply_or_create::<ConfigMap, _>(store, "default", "demo-content", &owner(owner_uid), set_content(content))
            .await
    }

    #[tokio::test]
    async fn test_creates_missing_object_with_owner() {
        let store = MockStore::<ConfigMap>::new();

        let applied = apply(&store, "uid-1", "v1").await.unwrap();

        assert!(matches!(applied, Applied::Created(_)));
        let stored = store.fetch("default", "demo-content").unwrap();
        assert_eq!(stored.metadata.name.as_deref(), Some("demo-content"));
        assert_eq!(stored.data.unwrap().get("index.html").map(String::as_str), Some("v1"));
        assert_eq!(stored.metadata.owner_references.unwrap(), vec![owner("uid-1")]);
        assert_eq!(store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_second_apply_is_unchanged() {
        let store = MockStore::<ConfigMap>::new();
        apply(&store, "uid-1", "v1").await.unwrap();

        let applied = apply(&store, "uid-1", "v1").await.unwrap();

        assert_eq!(applied.result(), "unchanged");
        assert!(!applied.wrote());
        assert_eq!(store.create_count(), 1);
        assert_eq!(store.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_foreign_fields() {
        let store = MockStore::<ConfigMap>::new();
        store.insert(ConfigMap {
            metadata: ObjectMeta {
                name: Some("demo-content".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(BTreeMap::from([("note".to_string(), "kept".to_string())])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("index.html".to_string(), "old".to_string())])),
            ..Default::default()
        });

        let applied = apply(&store, "uid-1", "new").await.unwrap();

        assert!(matches!(applied, Applied::Updated(_)));
        let stored = applied.into_inner();
        assert_eq!(stored.data.unwrap().get("index.html").map(String::as_str), Some("new"));
        assert_eq!(
            stored.metadata.annotations.unwrap().get("note").map(String::as_str),
            Some("kept")
        );
        assert_eq!(store.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let store = MockStore::<ConfigMap>::new();
        apply(&store, "uid-1", "v1").await.unwrap();
        store.conflict_next_replaces(1);

        let applied = apply(&store, "uid-1", "v2").await.unwrap();

        assert!(matches!(applied, Applied::Updated(_)));
        assert_eq!(store.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_second_conflict_is_surfaced() {
        let store = MockStore::<ConfigMap>::new();
        apply(&store, "uid-1", "v1").await.unwrap();
        store.conflict_next_replaces(2);

        let err = apply(&store, "uid-1", "v2").await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_lost_create_race_is_retried() {
        let store = MockStore::<ConfigMap>::new();
        store.fail_next_create(StoreError::AlreadyExists("default/demo-content".to_string()));

        let applied = apply(&store, "uid-1", "v1").await.unwrap();

        assert!(matches!(applied, Applied::Created(_)));
        assert_eq!(store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let store = MockStore::<ConfigMap>::new();
        apply(&store, "uid-1", "v1").await.unwrap();
        store.fail_next_replace(StoreError::Forbidden("rbac".to_string()));
        store.conflict_next_replaces(1);

        let err = apply(&store, "uid-1", "v2").await.unwrap_err();

        assert!(matches!(err, StoreError::Forbidden(_)));
        assert_eq!(store.replace_count(), 0);
    }

    #[test]
    fn test_owner_reference_replaces_same_uid_and_keeps_others() {
        let foreign = OwnerReference {
            kind: "ConfigMapGenerator".to_string(),
            name: "gen".to_string(),
            uid: "other".to_string(),
            controller: Some(false),
            ..Default::default()
        };
        let mut stale = owner("uid-1");
        stale.block_owner_deletion = None;

        let mut meta = ObjectMeta {
            owner_references: Some(vec![foreign.clone(), stale]),
            ..Default::default()
        };
        set_owner_reference(&mut meta, &owner("uid-1")).unwrap();

        assert_eq!(meta.owner_references.unwrap(), vec![foreign, owner("uid-1")]);
    }

    #[test]
    fn test_owner_reference_rejects_other_controller() {
        let mut meta = ObjectMeta {
            name: Some("demo-content".to_string()),
            owner_references: Some(vec![owner("someone-else")]),
            ..Default::default()
        };

        let err = set_owner_reference(&mut meta, &owner("uid-1")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
