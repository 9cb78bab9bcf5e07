mod common;

use chrono::{DateTime, Utc};
use common::*;
use softcascade::{
    AssociationMapping, CascadeError, Change, Entity, EntityMetadata, EntityRef, EntityStore,
    ForeignKeyMatch, InMemoryStore, MetadataCatalog, SoftDeleteOutcome, SoftDeleteRegistry, Value,
};
use std::sync::Arc;

#[test]
fn test_deleting_order_soft_deletes_its_lines() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let customer = store
        .insert(Customer {
            id: 1,
            name: "Ada".into(),
        })
        .unwrap();
    let order7 = store.insert(order(7, Some(1))).unwrap();
    let line1 = store.insert(line(1, 7)).unwrap();
    let line2 = store.insert(line(2, 7)).unwrap();
    let other = store.insert(line(3, 8)).unwrap();

    store.remove(&order7).unwrap();
    let report = store.flush(&listener).unwrap();

    assert!(is_soft_deleted(&order7));
    assert!(is_soft_deleted(&line1));
    assert!(is_soft_deleted(&line2));
    assert_eq!(field(&other, "deleted_at"), Value::Null);

    // Outward references of the deleted order stay as they are.
    assert_eq!(field(&order7, "customer"), Value::Integer(1));
    assert_eq!(field(&customer, "name"), Value::Text("Ada".into()));

    assert!(report.hard_deleted.is_empty());
    assert!(store.contains(&order7).unwrap());
    assert_eq!(report.summary.soft_deleted, 3);
    assert_eq!(report.summary.nulled_references, 0);
}

#[test]
fn test_deleting_order_nulls_invoice_references() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();
    let inv1 = store.insert(invoice(1, 7)).unwrap();
    let inv2 = store.insert(invoice(2, 7)).unwrap();
    let unrelated = store.insert(invoice(3, 9)).unwrap();

    store.remove(&order7).unwrap();
    let report = store.flush(&listener).unwrap();

    assert_eq!(field(&inv1, "order"), Value::Null);
    assert_eq!(field(&inv2, "order"), Value::Null);
    assert_eq!(field(&unrelated, "order"), Value::Integer(9));
    assert_eq!(report.summary.nulled_references, 2);
    assert!(store.contains(&inv1).unwrap());

    let invoice_changes: Vec<_> = store
        .changes()
        .for_entity("Invoice", &Value::Integer(1))
        .collect();
    assert_eq!(invoice_changes.len(), 2);
    assert!(matches!(
        invoice_changes[0],
        Change::PropertyChanged { field, old: Value::Integer(7), new: Value::Null, .. } if field == "order"
    ));
    assert!(invoice_changes[1].is_extra_update());
}

#[test]
fn test_marker_write_is_staged_with_extra_update() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();

    store.remove(&order7).unwrap();
    store.flush(&listener).unwrap();

    let changes: Vec<_> = store.changes().for_entity("Order", &Value::Integer(7)).collect();
    assert_eq!(changes.len(), 3);
    assert!(matches!(changes[0], Change::Persisted { .. }));
    assert!(matches!(
        changes[1],
        Change::PropertyChanged { field, old: Value::Null, new: Value::Timestamp(ts), .. }
            if field == "deleted_at" && *ts == deleted_at()
    ));
    assert!(changes[2].is_extra_update());
}

// Returns every instance of the dependent type, whether or not it matches.
struct LooseStore {
    inner: InMemoryStore,
}

impl EntityStore for LooseStore {
    fn scheduled_deletions(&self) -> Vec<EntityRef> {
        self.inner.scheduled_deletions()
    }

    fn query_by_foreign_keys(
        &self,
        dependent_type: &str,
        _relation_fields: &[String],
        _match_value: &Value,
    ) -> softcascade::Result<Vec<ForeignKeyMatch>> {
        Ok(self
            .inner
            .all(dependent_type)
            .into_iter()
            .map(ForeignKeyMatch::new)
            .collect())
    }

    fn supports_key_projection(&self) -> bool {
        false
    }

    fn persist(&mut self, entity: &EntityRef) -> softcascade::Result<()> {
        self.inner.persist(entity)
    }

    fn register_property_mutation(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> softcascade::Result<()> {
        self.inner.register_property_mutation(entity, field, old, new)
    }

    fn schedule_extra_update(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> softcascade::Result<()> {
        self.inner.schedule_extra_update(entity, field, old, new)
    }

    fn includes_late_mutations(&self) -> bool {
        true
    }
}

#[test]
fn test_already_null_reference_is_left_alone() {
    let listener = shop_listener();
    let mut inner = InMemoryStore::new();
    let order7 = inner.insert(order(7, None)).unwrap();
    let pointing = inner.insert(invoice(1, 7)).unwrap();
    let detached = inner
        .insert(Invoice {
            id: 2,
            order: None,
        })
        .unwrap();
    inner.remove(&order7).unwrap();
    let mut store = LooseStore { inner };

    let summary = listener.on_flush(&mut store).unwrap();

    assert_eq!(field(&pointing, "order"), Value::Null);
    assert_eq!(field(&detached, "order"), Value::Null);
    assert_eq!(summary.nulled_references, 1);

    let changes = property_changes(&store.inner);
    assert!(changes.contains(&("Invoice".into(), Value::Integer(1), "order".into())));
    assert!(!changes.contains(&("Invoice".into(), Value::Integer(2), "order".into())));
    // The store picks up late mutations itself.
    assert_eq!(store.inner.changes().extra_updates().count(), 0);
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Project {
    #[entity(id)]
    id: i64,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Task {
    #[entity(id)]
    id: i64,
    project: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Milestone {
    #[entity(id)]
    id: i64,
    project: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Deliverable {
    #[entity(id)]
    id: i64,
    task: Option<i64>,
    milestone: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[test]
fn test_diamond_soft_deletes_shared_dependent_once() {
    let metadata = vec![
        EntityMetadata::new("Project"),
        EntityMetadata::new("Task")
            .association(AssociationMapping::many_to_one("project", "Project").on_delete("CASCADE")),
        EntityMetadata::new("Milestone")
            .association(AssociationMapping::many_to_one("project", "Project").on_delete("CASCADE")),
        EntityMetadata::new("Deliverable")
            .association(AssociationMapping::many_to_one("task", "Task").on_delete("CASCADE"))
            .association(AssociationMapping::many_to_one("milestone", "Milestone").on_delete("CASCADE")),
    ];
    let registry = SoftDeleteRegistry::new()
        .with_entity::<Project>()
        .with_entity::<Task>()
        .with_entity::<Milestone>()
        .with_entity::<Deliverable>();
    let listener = listener_for(metadata, registry);

    let mut store = InMemoryStore::new();
    let project = store
        .insert(Project {
            id: 1,
            deleted_at: None,
        })
        .unwrap();
    store
        .insert(Task {
            id: 10,
            project: Some(1),
            deleted_at: None,
        })
        .unwrap();
    store
        .insert(Milestone {
            id: 20,
            project: Some(1),
            deleted_at: None,
        })
        .unwrap();
    let deliverable = store
        .insert(Deliverable {
            id: 30,
            task: Some(10),
            milestone: Some(20),
            deleted_at: None,
        })
        .unwrap();

    store.remove(&project).unwrap();
    let report = store.flush(&listener).unwrap();

    assert!(is_soft_deleted(&deliverable));
    let marker_writes = property_changes(&store)
        .into_iter()
        .filter(|(ty, _, field)| ty == "Deliverable" && field == "deleted_at")
        .count();
    assert_eq!(marker_writes, 1);
    assert_eq!(report.summary.soft_deleted, 4);
    assert_eq!(report.summary.already_visited, 1);
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Author {
    #[entity(id)]
    id: i64,
    featured_book: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Book {
    #[entity(id)]
    id: i64,
    author: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[test]
fn test_cyclic_cascade_terminates() {
    let metadata = vec![
        EntityMetadata::new("Author")
            .association(AssociationMapping::one_to_one("featured_book", "Book").on_delete("CASCADE")),
        EntityMetadata::new("Book")
            .association(AssociationMapping::many_to_one("author", "Author").on_delete("CASCADE")),
    ];
    let registry = SoftDeleteRegistry::new()
        .with_entity::<Author>()
        .with_entity::<Book>();
    let listener = listener_for(metadata, registry);

    let mut store = InMemoryStore::new();
    let author = store
        .insert(Author {
            id: 1,
            featured_book: Some(10),
            deleted_at: None,
        })
        .unwrap();
    let book = store
        .insert(Book {
            id: 10,
            author: Some(1),
            deleted_at: None,
        })
        .unwrap();

    store.remove(&author).unwrap();
    let report = store.flush(&listener).unwrap();

    assert!(is_soft_deleted(&author));
    assert!(is_soft_deleted(&book));
    assert_eq!(report.summary.soft_deleted, 2);
    assert_eq!(report.summary.already_visited, 1);
    assert_eq!(property_changes(&store).len(), 2);
}

#[test]
fn test_already_deleted_instance_is_hard_deleted() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let order7 = store
        .insert(Order {
            id: 7,
            customer: None,
            deleted_at: Some(deleted_at() - chrono::Duration::days(30)),
        })
        .unwrap();
    let line1 = store.insert(line(1, 7)).unwrap();
    let inv1 = store.insert(invoice(1, 7)).unwrap();

    store.remove(&order7).unwrap();
    let report = store.flush(&listener).unwrap();

    assert_eq!(report.summary.already_deleted, 1);
    assert_eq!(report.summary.soft_deleted, 0);
    assert_eq!(report.hard_deleted, vec![("Order".to_string(), Value::Integer(7))]);
    assert!(!store.contains(&order7).unwrap());

    // No cascade ran.
    assert_eq!(field(&line1, "deleted_at"), Value::Null);
    assert_eq!(field(&inv1, "order"), Value::Integer(7));
    assert!(property_changes(&store).is_empty());
}

#[derive(Debug, Entity)]
struct Shipment {
    #[entity(id)]
    id: i64,
    order: Option<i64>,
}

#[test]
fn test_references_cleared_before_dependents_soft_deleted() {
    // "OrderLine" sorts before "Shipment": ordering must not follow type order.
    let mut metadata = shop_metadata();
    metadata.push(
        EntityMetadata::new("Shipment")
            .association(AssociationMapping::many_to_one("order", "Order").on_delete("SET NULL")),
    );
    let listener = listener_for(metadata, shop_registry());

    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();
    store.insert(line(1, 7)).unwrap();
    store
        .insert(Shipment {
            id: 5,
            order: Some(7),
        })
        .unwrap();
    store.insert(invoice(2, 7)).unwrap();

    store.remove(&order7).unwrap();
    store.flush(&listener).unwrap();

    let changes = property_changes(&store);
    let position = |ty: &str| changes.iter().position(|(t, _, _)| t == ty).unwrap();
    assert!(position("Shipment") < position("OrderLine"));
    assert!(position("Invoice") < position("OrderLine"));
    assert_eq!(position("Order"), 0);
}

#[test]
fn test_non_soft_deletable_delete_passes_through() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let customer = store
        .insert(Customer {
            id: 1,
            name: "Ada".into(),
        })
        .unwrap();
    let order1 = store.insert(order(1, Some(1))).unwrap();

    store.remove(&customer).unwrap();
    let report = store.flush(&listener).unwrap();

    assert_eq!(report.summary.hard_deletes, 1);
    assert_eq!(report.hard_deleted, vec![("Customer".to_string(), Value::Integer(1))]);
    // The store's own constraint handling owns this reference.
    assert_eq!(field(&order1, "customer"), Value::Integer(1));
    assert!(property_changes(&store).is_empty());
}

#[derive(Debug, Entity)]
struct AuditEntry {
    #[entity(id)]
    id: i64,
    order: Option<i64>,
}

#[test]
fn test_cascade_into_non_soft_deletable_type_is_ignored() {
    let mut metadata = shop_metadata();
    metadata.push(
        EntityMetadata::new("AuditEntry")
            .association(AssociationMapping::many_to_one("order", "Order").on_delete("CASCADE")),
    );
    let listener = listener_for(metadata, shop_registry());

    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();
    let entry = store
        .insert(AuditEntry {
            id: 1,
            order: Some(7),
        })
        .unwrap();
    // Any lookup of AuditEntry would fail the flush.
    store.fail_queries_on("AuditEntry");

    store.remove(&order7).unwrap();
    store.flush(&listener).unwrap();

    assert!(is_soft_deleted(&order7));
    assert_eq!(field(&entry, "order"), Value::Integer(7));
}

#[test]
fn test_query_failure_aborts_and_rolls_back_flush() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();
    let inv = store.insert(invoice(1, 7)).unwrap();
    store.insert(line(1, 7)).unwrap();
    store.fail_queries_on("OrderLine");

    store.remove(&order7).unwrap();
    let err = store.flush(&listener).unwrap_err();

    assert!(matches!(err, CascadeError::QueryFailed(msg) if msg.contains("OrderLine")));
    assert_eq!(field(&order7, "deleted_at"), Value::Null);
    assert_eq!(field(&inv, "order"), Value::Integer(7));
    assert!(store.is_scheduled_for_deletion(&order7));
    assert!(store.changes().is_empty());
}

#[test]
fn test_observers_see_nested_pre_and_post_events() {
    let mut listener = shop_listener();
    let recorder = Arc::new(Recorder::default());
    listener.subscribe(recorder.clone());

    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();
    store.insert(line(1, 7)).unwrap();

    store.remove(&order7).unwrap();
    store.flush(&listener).unwrap();

    assert_eq!(
        recorder.entries(),
        vec![
            "preSoftDelete:Order#7",
            "preSoftDelete:OrderLine#1",
            "postSoftDelete:OrderLine#1",
            "postSoftDelete:Order#7",
        ]
    );
}

#[test]
fn test_visited_set_does_not_leak_across_flushes() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();

    store.remove(&order7).unwrap();
    let first = store.flush(&listener).unwrap();
    assert_eq!(first.summary.soft_deleted, 1);

    // Restore and delete again: a leaked visited set would skip it.
    order7.replace_field_value("deleted_at", Value::Null).unwrap();
    store.remove(&order7).unwrap();
    let second = store.flush(&listener).unwrap();

    assert_eq!(second.summary.soft_deleted, 1);
    assert_eq!(second.summary.already_visited, 0);
}

#[test]
fn test_flush_cycle_reports_outcomes() {
    let listener = shop_listener();
    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();
    let invoice1 = store.insert(invoice(1, 7)).unwrap();

    let mut cycle = listener.begin_flush(&mut store);
    assert_eq!(cycle.schedule_soft_delete(&order7).unwrap(), SoftDeleteOutcome::SoftDeleted);
    assert_eq!(cycle.schedule_soft_delete(&order7).unwrap(), SoftDeleteOutcome::AlreadyVisited);
    assert_eq!(
        cycle.schedule_soft_delete(&invoice1).unwrap(),
        SoftDeleteOutcome::NotSoftDeletable
    );
    assert_eq!(cycle.visited().len(), 2);

    let summary = cycle.finish();
    assert_eq!(summary.soft_deleted, 1);
    assert_eq!(summary.nulled_references, 1);
}

#[test]
fn test_listener_is_shareable_between_threads() {
    let listener = Arc::new(shop_listener());

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let listener = Arc::clone(&listener);
            std::thread::spawn(move || {
                let mut store = InMemoryStore::new();
                let order = store.insert(order(n, None)).unwrap();
                store.insert(line(n * 10, n)).unwrap();
                store.remove(&order).unwrap();
                store.flush(&listener).unwrap().summary.soft_deleted
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 2);
    }
}

#[test]
fn test_marker_field_from_registry_is_used() {
    let registry = SoftDeleteRegistry::new()
        .with_type("Order", "customer")
        .with_entity::<OrderLine>();
    let listener = listener_for(shop_metadata(), registry);
    let mut store = InMemoryStore::new();
    let order7 = store.insert(order(7, None)).unwrap();

    store.remove(&order7).unwrap();
    let err = store.flush(&listener).unwrap_err();

    // `customer` holds an i64, not a timestamp.
    assert!(matches!(err, CascadeError::TypeMismatch(_)));
    assert_eq!(field(&order7, "customer"), Value::Null);
    assert_eq!(order7.entity_type().unwrap(), "Order");
}

#[derive(Debug, Entity)]
#[entity(soft_delete = "deleted_at")]
struct Bill {
    #[entity(id)]
    id: i64,
    order: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

// Subclass of Bill with no registry entry of its own.
#[derive(Debug, Entity)]
struct CreditNote {
    #[entity(id)]
    id: i64,
    order: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

fn billing_metadata() -> Vec<EntityMetadata> {
    let mut metadata = shop_metadata();
    metadata.push(
        EntityMetadata::new("Bill")
            .sub_class("CreditNote")
            .association(AssociationMapping::many_to_one("order", "Order").on_delete("CASCADE")),
    );
    metadata.push(
        EntityMetadata::new("CreditNote").association(
            AssociationMapping::many_to_one("order", "Order")
                .on_delete("CASCADE")
                .inherited_from("Bill"),
        ),
    );
    metadata
}

fn billing_store() -> InMemoryStore {
    let catalog = MetadataCatalog::from_entities(billing_metadata()).unwrap();
    let mut store = InMemoryStore::new();
    store.register_hierarchy(&catalog).unwrap();
    store
}

#[test]
fn test_cascade_soft_deletes_subclass_dependents() {
    let listener = listener_for(billing_metadata(), shop_registry().with_entity::<Bill>());
    let mut store = billing_store();
    let order7 = store.insert(order(7, None)).unwrap();
    let bill = store
        .insert(Bill {
            id: 1,
            order: Some(7),
            deleted_at: None,
        })
        .unwrap();
    let credit = store
        .insert(CreditNote {
            id: 2,
            order: Some(7),
            deleted_at: None,
        })
        .unwrap();

    store.remove(&order7).unwrap();
    let report = store.flush(&listener).unwrap();

    assert!(is_soft_deleted(&bill));
    assert!(is_soft_deleted(&credit));
    assert_eq!(field(&credit, "order"), Value::Integer(7));
    assert_eq!(report.summary.soft_deleted, 3);
    assert!(report.hard_deleted.is_empty());
}

#[test]
fn test_scheduled_subclass_instance_is_soft_deleted() {
    let listener = listener_for(billing_metadata(), shop_registry().with_entity::<Bill>());
    let mut store = billing_store();
    let credit = store
        .insert(CreditNote {
            id: 3,
            order: None,
            deleted_at: None,
        })
        .unwrap();

    store.remove(&credit).unwrap();
    let report = store.flush(&listener).unwrap();

    assert!(is_soft_deleted(&credit));
    assert_eq!(report.summary.hard_deletes, 0);
    assert!(report.hard_deleted.is_empty());
    assert!(store.contains(&credit).unwrap());
}

// Refuses to record mutations of one field.
struct RefusingStore {
    inner: InMemoryStore,
    refused_field: &'static str,
}

impl EntityStore for RefusingStore {
    fn scheduled_deletions(&self) -> Vec<EntityRef> {
        self.inner.scheduled_deletions()
    }

    fn query_by_foreign_keys(
        &self,
        dependent_type: &str,
        relation_fields: &[String],
        match_value: &Value,
    ) -> softcascade::Result<Vec<ForeignKeyMatch>> {
        self.inner
            .query_by_foreign_keys(dependent_type, relation_fields, match_value)
    }

    fn persist(&mut self, entity: &EntityRef) -> softcascade::Result<()> {
        self.inner.persist(entity)
    }

    fn register_property_mutation(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> softcascade::Result<()> {
        if field == self.refused_field {
            return Err(CascadeError::StoreError(format!("cannot track '{}'", field)));
        }
        self.inner.register_property_mutation(entity, field, old, new)
    }

    fn schedule_extra_update(
        &mut self,
        entity: &EntityRef,
        field: &str,
        old: &Value,
        new: &Value,
    ) -> softcascade::Result<()> {
        self.inner.schedule_extra_update(entity, field, old, new)
    }
}

#[test]
fn test_rejected_marker_write_is_undone() {
    let listener = shop_listener();
    let mut inner = InMemoryStore::new();
    let order7 = inner.insert(order(7, None)).unwrap();
    inner.remove(&order7).unwrap();
    let mut store = RefusingStore {
        inner,
        refused_field: "deleted_at",
    };

    let err = listener.on_flush(&mut store).unwrap_err();

    assert!(matches!(err, CascadeError::StoreError(msg) if msg.contains("deleted_at")));
    assert_eq!(field(&order7, "deleted_at"), Value::Null);
    assert!(property_changes(&store.inner).is_empty());
}

#[test]
fn test_rejected_reference_clear_is_undone() {
    let listener = shop_listener();
    let mut inner = InMemoryStore::new();
    let order7 = inner.insert(order(7, None)).unwrap();
    let invoice1 = inner.insert(invoice(1, 7)).unwrap();
    inner.remove(&order7).unwrap();
    let mut store = RefusingStore {
        inner,
        refused_field: "order",
    };

    let err = listener.on_flush(&mut store).unwrap_err();

    assert!(matches!(err, CascadeError::StoreError(_)));
    assert_eq!(field(&invoice1, "order"), Value::Integer(7));
    // The marker write was recorded, so the store can still roll it back.
    assert_eq!(
        property_changes(&store.inner),
        vec![("Order".to_string(), Value::Integer(7), "deleted_at".to_string())]
    );
}
