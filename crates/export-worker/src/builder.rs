//! Builder pass: PENDING → PROCESSED with a serialized payload attached.

use crate::consolidate::{consolidate_order, Consolidation};
use crate::payload::{build_task_payload, BuildOptions};
use crate::{ExportError, ExportResult};
use chrono::Utc;
use order_store::{OrderPatch, OrderStore};
use std::sync::Arc;
use sync_database::{Database, ExportContext, ExportQueueEntry, ExportStatus};
use tracing::{debug, warn};

/// Configuration for the builder pass.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Maximum entries per pass.
    pub batch_size: usize,
    /// Ship method that keeps its own name as the carrier skill.
    pub preferred_carrier: String,
    /// Swap pickup/dropoff for return authorizations.
    pub swap_return_locations: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            preferred_carrier: "Courier Express".to_string(),
            swap_return_locations: false,
        }
    }
}

/// Drains PENDING export entries: consolidates duplicates, resolves the
/// delete/backorder special cases, builds the task payload.
pub struct BuilderPass {
    db: Arc<Database>,
    store: Arc<dyn OrderStore>,
    config: BuilderConfig,
}

impl BuilderPass {
    pub fn new(db: Arc<Database>, store: Arc<dyn OrderStore>, config: BuilderConfig) -> Self {
        Self { db, store, config }
    }

    /// Run one builder pass. Returns the number of entries claimed.
    ///
    /// A failure on one entry marks that entry and never aborts the batch.
    pub fn run_pass(&self) -> ExportResult<usize> {
        let ids = self.db.pending_export_ids(self.config.batch_size)?;
        let mut claimed = 0;

        for id in ids {
            if !self.db.try_claim_export(id, &[ExportStatus::Pending])? {
                continue;
            }
            claimed += 1;

            if let Err(err) = self.process_entry(id) {
                warn!(entry_id = id, error = %err, "Export build failed");
                let _ = self
                    .db
                    .mark_export_processed(id, None, None, Some(&err.to_string()));
            }
        }

        if claimed > 0 {
            debug!(claimed, "Builder pass complete");
        }
        Ok(claimed)
    }

    fn process_entry(&self, id: i64) -> ExportResult<()> {
        let Some(entry) = self.db.get_export_entry(id)? else {
            return Ok(());
        };

        match consolidate_order(&self.db, entry.order_id, entry.id)? {
            Consolidation::Superseded => {
                debug!(entry_id = id, order_id = entry.order_id, "Entry superseded");
                return Ok(());
            }
            Consolidation::Kept => {}
        }

        let mut order = match self.store.load(entry.order_type, entry.order_id) {
            Ok(order) => order,
            Err(err) => {
                // Operator review, not retried: a load failure will not
                // self-correct without an upstream fix.
                self.db.mark_export_processed(
                    id,
                    None,
                    None,
                    Some(&format!("order load failed: {err}")),
                )?;
                return Ok(());
            }
        };

        let known_task_id = entry
            .courier_task_id
            .clone()
            .or_else(|| order.courier_task_id.clone());

        // Delete path: explicit delete, or a fully-closed order (all lines
        // fulfilled) that no longer needs a task.
        if entry.context == ExportContext::Delete
            || (order.closed && order.all_lines_fulfilled())
        {
            return self.prepare_delete(&entry, known_task_id.as_deref());
        }

        // Closed but not fully fulfilled: nothing to sync yet; a later
        // fulfilment edit re-enqueues.
        if order.closed {
            self.db
                .mark_export_success(id, Some("order closed before full fulfilment"))?;
            return Ok(());
        }

        let mut context = entry.context;

        if context == ExportContext::Backorder {
            // Start the task over: archive the current task id into history,
            // clear the courier linkage, and dispatch as a fresh create.
            order.reset_courier_linkage();
            let patch = OrderPatch {
                courier_task_id: Some(None),
                task_status: Some(None),
                tracking_link: Some(None),
                driver: Some(None),
                route_stop: Some(None),
                released: Some(false),
                task_id_history: Some(order.task_id_history.clone()),
                ..Default::default()
            };
            if let Err(err) = self.store.apply_patch(entry.order_type, entry.order_id, &patch) {
                self.db.mark_export_processed(
                    id,
                    None,
                    None,
                    Some(&format!("backorder reset failed: {err}")),
                )?;
                return Ok(());
            }
            context = ExportContext::Create;
        } else if entry.courier_task_id.is_none() {
            // Reconciliation: the order already has a task this entry does
            // not know about; correct to an edit to avoid a duplicate create.
            if let Some(task_id) = &order.courier_task_id {
                self.db.set_export_task_id(id, task_id)?;
                context = ExportContext::Edit;
            }
        }

        let options = BuildOptions {
            preferred_carrier: self.config.preferred_carrier.clone(),
            swap_return_locations: self.config.swap_return_locations,
        };

        match build_task_payload(&order, &options, Utc::now().date_naive()) {
            Ok(payload) => {
                let json = serde_json::to_string(&payload)?;
                let rewrite = (context != entry.context).then_some(context);
                self.db.mark_export_processed(id, Some(&json), rewrite, None)?;
                debug!(entry_id = id, order_id = entry.order_id, "Payload built");
            }
            Err(ExportError::Build(message)) => {
                self.db.mark_export_processed(id, None, None, Some(&message))?;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Prepare an entry for delete dispatch, or short-circuit when there is
    /// no remote task to delete.
    fn prepare_delete(&self, entry: &ExportQueueEntry, task_id: Option<&str>) -> ExportResult<()> {
        match task_id {
            Some(task_id) => {
                if entry.courier_task_id.is_none() {
                    self.db.set_export_task_id(entry.id, task_id)?;
                }
                self.db
                    .mark_export_processed(entry.id, None, Some(ExportContext::Delete), None)?;
            }
            None => {
                self.db
                    .mark_export_success(entry.id, Some("no courier task to delete"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use order_store::{Address, MemoryOrderStore, Order, OrderLine, PickupSite};
    use sync_database::{NewExportEntry, OrderType};

    fn sample_order(id: i64) -> Order {
        Order {
            id,
            order_type: OrderType::SalesOrder,
            reference: format!("SO{id}"),
            closed: false,
            customer_name: "Acme Ltd".to_string(),
            fulfilment_email: "ops@acme.example".to_string(),
            order_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            required_date: None,
            subtotal: 100.0,
            memo: String::new(),
            ship_method: "Courier Express".to_string(),
            delivery_service: String::new(),
            site_contact_name: "Pat".to_string(),
            site_contact_phone: String::new(),
            raised_by: String::new(),
            driver_notes: String::new(),
            shipping_address: Address {
                addr1: "9 Main St".to_string(),
                city: "York".to_string(),
                zip: "YO1 1AA".to_string(),
                country: "GB".to_string(),
                ..Default::default()
            },
            pickup_site: Some(PickupSite {
                addr1: "1 Depot Way".to_string(),
                city: "Leeds".to_string(),
                zip: "LS1 1AA".to_string(),
                country: "GB".to_string(),
                ..Default::default()
            }),
            courier_task_id: None,
            task_status: None,
            tracking_link: None,
            driver: None,
            route_stop: None,
            released: true,
            release_to_courier: true,
            customer_pickup: false,
            task_id_history: None,
            ship_date: None,
            lines: vec![OrderLine {
                item: "WID-1".to_string(),
                description: "Widget".to_string(),
                quantity: 5.0,
                fulfilled: 0.0,
                weight: Some(1.0),
            }],
        }
    }

    fn new_entry(order_id: i64, context: ExportContext) -> NewExportEntry {
        NewExportEntry {
            order_id,
            order_type: OrderType::SalesOrder,
            context,
            courier_task_id: None,
            payload: None,
        }
    }

    fn setup() -> (Arc<Database>, Arc<MemoryOrderStore>, BuilderPass) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(MemoryOrderStore::new());
        let pass = BuilderPass::new(db.clone(), store.clone(), BuilderConfig::default());
        (db, store, pass)
    }

    #[test]
    fn pending_entry_becomes_processed_with_payload() {
        let (db, store, pass) = setup();
        store.insert(sample_order(45));
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Create)).unwrap();

        assert_eq!(pass.run_pass().unwrap(), 1);

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Processed);
        assert!(entry.last_error.is_none());

        let payload: serde_json::Value =
            serde_json::from_str(entry.payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload["externalId"], "45");
        assert_eq!(payload["items"][0]["quantity"], 5.0);
    }

    #[test]
    fn superseded_entry_is_dropped_not_built() {
        let (db, store, pass) = setup();
        store.insert(sample_order(45));
        let old = db.insert_export_entry(&new_entry(45, ExportContext::Create)).unwrap();
        let newer = db.insert_export_entry(&new_entry(45, ExportContext::Edit)).unwrap();

        pass.run_pass().unwrap();

        // The older entry was deleted during consolidation; only the newest
        // reached PROCESSED.
        assert!(db.get_export_entry(old.id).unwrap().is_none());
        let newer = db.get_export_entry(newer.id).unwrap().unwrap();
        assert_eq!(newer.status, ExportStatus::Processed);
    }

    #[test]
    fn order_load_failure_parks_entry_for_review() {
        let (db, _store, pass) = setup();
        // No order inserted: the load fails with NotFound.
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Create)).unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Processed);
        assert!(entry.payload.is_none());
        assert!(entry.last_error.as_deref().unwrap().contains("order load failed"));
    }

    #[test]
    fn missing_pickup_site_parks_entry_with_build_error() {
        let (db, store, pass) = setup();
        let mut order = sample_order(45);
        order.pickup_site = None;
        store.insert(order);
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Create)).unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Processed);
        assert!(entry.last_error.as_deref().unwrap().contains("pickup site"));
    }

    #[test]
    fn closed_fulfilled_order_with_task_prepares_delete() {
        let (db, store, pass) = setup();
        let mut order = sample_order(45);
        order.closed = true;
        order.lines[0].fulfilled = 5.0;
        order.courier_task_id = Some("T-7".to_string());
        store.insert(order);
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Edit)).unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Processed);
        assert_eq!(entry.context, ExportContext::Delete);
        assert_eq!(entry.courier_task_id.as_deref(), Some("T-7"));
        assert!(entry.payload.is_none());
    }

    #[test]
    fn delete_without_task_short_circuits_to_success() {
        let (db, store, pass) = setup();
        store.insert(sample_order(45));
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Delete)).unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Success);
        assert_eq!(entry.last_error.as_deref(), Some("no courier task to delete"));
    }

    #[test]
    fn closed_unfulfilled_order_resolves_with_note() {
        let (db, store, pass) = setup();
        let mut order = sample_order(45);
        order.closed = true;
        store.insert(order);
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Edit)).unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Success);
        assert!(entry.last_error.as_deref().unwrap().contains("closed"));
    }

    #[test]
    fn backorder_archives_task_and_rewrites_to_create() {
        let (db, store, pass) = setup();
        let mut order = sample_order(45);
        order.courier_task_id = Some("T-old".to_string());
        order.task_id_history = Some("T-ancient".to_string());
        store.insert(order);
        let entry = db
            .insert_export_entry(&new_entry(45, ExportContext::Backorder))
            .unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, ExportStatus::Processed);
        assert_eq!(entry.context, ExportContext::Create);
        assert!(entry.payload.is_some());

        let order = store.get(OrderType::SalesOrder, 45).unwrap();
        assert!(order.courier_task_id.is_none());
        assert_eq!(order.task_id_history.as_deref(), Some("T-ancient,T-old"));
        assert!(!order.released);
    }

    #[test]
    fn entry_adopts_task_id_from_order_as_edit() {
        let (db, store, pass) = setup();
        let mut order = sample_order(45);
        order.courier_task_id = Some("T-9".to_string());
        store.insert(order);
        let entry = db.insert_export_entry(&new_entry(45, ExportContext::Create)).unwrap();

        pass.run_pass().unwrap();

        let entry = db.get_export_entry(entry.id).unwrap().unwrap();
        assert_eq!(entry.context, ExportContext::Edit);
        assert_eq!(entry.courier_task_id.as_deref(), Some("T-9"));
        assert_eq!(entry.status, ExportStatus::Processed);
    }

    #[test]
    fn claimed_batch_count_is_reported() {
        let (db, store, pass) = setup();
        for id in 1..=3 {
            store.insert(sample_order(id));
            db.insert_export_entry(&new_entry(id, ExportContext::Create)).unwrap();
        }
        assert_eq!(pass.run_pass().unwrap(), 3);
        // Nothing left pending.
        assert_eq!(pass.run_pass().unwrap(), 0);
    }
}
