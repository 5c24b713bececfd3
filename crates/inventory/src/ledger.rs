use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::{Aggregate, AggregateRoot, DomainError, DomainResult, Money, TenantId, UserId};
use gescom_events::Event;
use gescom_products::ProductId;

use crate::movement::{MovementDirection, MovementQuantity, MovementType, StockMovement};

/// Aggregate root: StockLedger (one per product).
///
/// The ledger opens implicitly with the first movement and starts at zero.
/// `quantity()` is the cached result of the movement chain; it is never
/// recomputed from history on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedger {
    product_id: ProductId,
    tenant_id: Option<TenantId>,
    quantity: u32,
    movements: Vec<StockMovement>,
    version: u64,
}

impl StockLedger {
    /// Stream type of stock ledgers; one stream per product id.
    pub const AGGREGATE_TYPE: &'static str = "inventory.stock_ledger";

    /// Create an empty ledger instance for rehydration.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            tenant_id: None,
            quantity: 0,
            movements: Vec::new(),
            version: 0,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Current on-hand quantity.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn movement_count(&self) -> usize {
        self.movements.len()
    }

    /// Movements, newest first.
    ///
    /// Lazy and restartable: clone the iterator or call again to walk from the top.
    pub fn movement_history(&self) -> MovementHistory<'_> {
        MovementHistory {
            inner: self.movements.iter().rev(),
        }
    }

    /// Latest movement, if any.
    pub fn last_movement(&self) -> Option<&StockMovement> {
        self.movements.last()
    }
}

impl AggregateRoot for StockLedger {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Reverse-chronological view over a ledger's movements.
#[derive(Debug, Clone)]
pub struct MovementHistory<'a> {
    inner: core::iter::Rev<core::slice::Iter<'a, StockMovement>>,
}

impl<'a> Iterator for MovementHistory<'a> {
    type Item = &'a StockMovement;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for MovementHistory<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for MovementHistory<'_> {}

/// Quantities before and after a recorded movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub previous_quantity: u32,
    pub new_quantity: u32,
}

impl From<&StockMovement> for MovementOutcome {
    fn from(m: &StockMovement) -> Self {
        Self {
            previous_quantity: m.previous_quantity,
            new_quantity: m.new_quantity,
        }
    }
}

impl MovementOutcome {
    /// Outcome of the movement carried by a list of ledger events.
    pub fn from_events(events: &[StockEvent]) -> Option<Self> {
        events.iter().rev().find_map(|e| match e {
            StockEvent::MovementRecorded(m) => Some(Self::from(m)),
        })
    }
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: MovementQuantity,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<Money>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl RecordMovement {
    /// Outbound delta movement, as written by deliveries.
    pub fn outbound(
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: u32,
        reference: impl Into<String>,
        actor: Option<UserId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            product_id,
            movement_type: MovementType::StockOut,
            quantity: MovementQuantity::Delta(quantity),
            reason: None,
            reference: Some(reference.into()),
            unit_cost: None,
            actor,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    RecordMovement(RecordMovement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    MovementRecorded(StockMovement),
}

impl StockEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            StockEvent::MovementRecorded(m) => m.tenant_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            StockEvent::MovementRecorded(m) => m.product_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementRecorded(_) => "inventory.stock.movement_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::MovementRecorded(m) => m.occurred_at,
        }
    }
}

impl Aggregate for StockLedger {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::MovementRecorded(m) => {
                self.product_id = m.product_id;
                self.tenant_id = Some(m.tenant_id);
                self.quantity = m.new_quantity;
                self.movements.push(m.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::RecordMovement(cmd) => self.handle_record(cmd),
        }
    }
}

impl StockLedger {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.product_id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_product_id(cmd.product_id)?;
        cmd.quantity.validate_for(cmd.movement_type)?;

        let previous = self.quantity;
        let new_quantity = match (cmd.movement_type.direction(), cmd.quantity) {
            (MovementDirection::Absolute, MovementQuantity::SetTo(target)) => target,
            (MovementDirection::Inbound, MovementQuantity::Delta(qty)) => previous
                .checked_add(qty)
                .ok_or_else(|| DomainError::invalid_input("stock quantity overflow"))?,
            (MovementDirection::Outbound, MovementQuantity::Delta(qty)) => {
                if qty > previous {
                    return Err(DomainError::InsufficientStock {
                        requested: qty,
                        available: previous,
                    });
                }
                previous - qty
            }
            _ => return Err(DomainError::invalid_input("quantity does not match movement type")),
        };

        Ok(vec![StockEvent::MovementRecorded(StockMovement {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            movement_type: cmd.movement_type,
            quantity: cmd.quantity,
            delta: i64::from(new_quantity) - i64::from(previous),
            previous_quantity: previous,
            new_quantity,
            reason: cmd.reason.clone(),
            reference: cmd.reference.clone(),
            unit_cost: cmd.unit_cost,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Replay a chronological movement chain from zero and return the final quantity.
///
/// Fails with `InvariantViolation` if a link does not start where the previous
/// one ended or its `new_quantity` disagrees with its delta.
pub fn replay_quantity<'a, I>(movements: I) -> DomainResult<u32>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    let mut running: u32 = 0;
    for (idx, m) in movements.into_iter().enumerate() {
        if m.previous_quantity != running {
            return Err(DomainError::invariant(format!(
                "movement #{} starts at {} but the chain is at {running}",
                idx + 1,
                m.previous_quantity
            )));
        }
        let expected = i64::from(m.previous_quantity) + m.delta;
        if expected != i64::from(m.new_quantity) {
            return Err(DomainError::invariant(format!(
                "movement #{} does not add up: {} + {} != {}",
                idx + 1,
                m.previous_quantity,
                m.delta,
                m.new_quantity
            )));
        }
        running = m.new_quantity;
    }
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gescom_events::execute;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn movement(
        tenant_id: TenantId,
        product_id: ProductId,
        movement_type: MovementType,
        quantity: MovementQuantity,
    ) -> StockCommand {
        StockCommand::RecordMovement(RecordMovement {
            tenant_id,
            product_id,
            movement_type,
            quantity,
            reason: None,
            reference: None,
            unit_cost: None,
            actor: None,
            occurred_at: test_time(),
        })
    }

    fn ledger_with(tenant_id: TenantId, product_id: ProductId, qty: u32) -> StockLedger {
        let mut ledger = StockLedger::empty(product_id);
        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::StockIn, MovementQuantity::Delta(qty)),
        )
        .unwrap();
        ledger
    }

    #[test]
    fn stock_in_increases_quantity() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let ledger = ledger_with(tenant_id, product_id, 10);

        assert_eq!(ledger.quantity(), 10);
        assert_eq!(ledger.version(), 1);
        let m = ledger.last_movement().unwrap();
        assert_eq!((m.previous_quantity, m.new_quantity, m.delta), (0, 10, 10));
    }

    #[test]
    fn outbound_beyond_stock_is_rejected_and_leaves_quantity() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let mut ledger = ledger_with(tenant_id, product_id, 10);

        let err = execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::StockOut, MovementQuantity::Delta(15)),
        )
        .unwrap_err();

        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: 15,
                available: 10
            }
        );
        assert_eq!(ledger.quantity(), 10);
        assert_eq!(ledger.movement_count(), 1);
    }

    #[test]
    fn damage_and_transfer_are_outbound_return_is_inbound() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let mut ledger = ledger_with(tenant_id, product_id, 10);

        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::Damage, MovementQuantity::Delta(2)),
        )
        .unwrap();
        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::Transfer, MovementQuantity::Delta(3)),
        )
        .unwrap();
        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::Return, MovementQuantity::Delta(1)),
        )
        .unwrap();

        assert_eq!(ledger.quantity(), 6);
    }

    #[test]
    fn adjustment_sets_absolute_quantity_and_records_delta() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let mut ledger = ledger_with(tenant_id, product_id, 10);

        let events = execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::Adjustment, MovementQuantity::SetTo(4)),
        )
        .unwrap();

        let outcome = MovementOutcome::from_events(&events).unwrap();
        assert_eq!(outcome.previous_quantity, 10);
        assert_eq!(outcome.new_quantity, 4);
        assert_eq!(ledger.last_movement().unwrap().delta, -6);
        assert_eq!(ledger.quantity(), 4);
    }

    #[test]
    fn no_op_adjustment_is_still_recorded() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let mut ledger = ledger_with(tenant_id, product_id, 7);

        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::Adjustment, MovementQuantity::SetTo(7)),
        )
        .unwrap();

        assert_eq!(ledger.movement_count(), 2);
        assert_eq!(ledger.last_movement().unwrap().delta, 0);
    }

    #[test]
    fn quantity_form_must_match_type() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let ledger = ledger_with(tenant_id, product_id, 5);

        let err = ledger
            .handle(&movement(
                tenant_id,
                product_id,
                MovementType::StockOut,
                MovementQuantity::SetTo(1),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let err = ledger
            .handle(&movement(
                tenant_id,
                product_id,
                MovementType::Adjustment,
                MovementQuantity::Delta(1),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn foreign_tenant_is_rejected() {
        let product_id = ProductId::generate();
        let ledger = ledger_with(test_tenant_id(), product_id, 5);

        let err = ledger
            .handle(&movement(
                test_tenant_id(),
                product_id,
                MovementType::StockIn,
                MovementQuantity::Delta(1),
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn history_is_newest_first_and_restartable() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let mut ledger = ledger_with(tenant_id, product_id, 10);
        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::StockOut, MovementQuantity::Delta(4)),
        )
        .unwrap();
        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::StockIn, MovementQuantity::Delta(1)),
        )
        .unwrap();

        let history = ledger.movement_history();
        assert_eq!(history.len(), 3);

        let types: Vec<_> = history.clone().map(|m| m.movement_type).collect();
        assert_eq!(
            types,
            vec![MovementType::StockIn, MovementType::StockOut, MovementType::StockIn]
        );

        // Walking again from a clone yields the same sequence.
        let again: Vec<_> = history.map(|m| m.new_quantity).collect();
        assert_eq!(again, vec![7, 6, 10]);

        let oldest = ledger.movement_history().next_back().unwrap();
        assert_eq!(oldest.previous_quantity, 0);
    }

    #[test]
    fn replay_reproduces_cached_quantity() {
        let tenant_id = test_tenant_id();
        let product_id = ProductId::generate();
        let mut ledger = ledger_with(tenant_id, product_id, 10);
        execute(
            &mut ledger,
            &movement(tenant_id, product_id, MovementType::Adjustment, MovementQuantity::SetTo(3)),
        )
        .unwrap();

        let chronological: Vec<_> = ledger.movement_history().rev().cloned().collect();
        assert_eq!(replay_quantity(&chronological).unwrap(), ledger.quantity());

        let mut broken = chronological;
        broken[1].previous_quantity = 9;
        assert!(matches!(
            replay_quantity(&broken),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_command() -> impl Strategy<Value = (MovementType, MovementQuantity)> {
            prop_oneof![
                (1u32..50).prop_map(|q| (MovementType::StockIn, MovementQuantity::Delta(q))),
                (1u32..50).prop_map(|q| (MovementType::StockOut, MovementQuantity::Delta(q))),
                (1u32..50).prop_map(|q| (MovementType::Damage, MovementQuantity::Delta(q))),
                (1u32..50).prop_map(|q| (MovementType::Transfer, MovementQuantity::Delta(q))),
                (1u32..50).prop_map(|q| (MovementType::Return, MovementQuantity::Delta(q))),
                (0u32..100).prop_map(|q| (MovementType::Adjustment, MovementQuantity::SetTo(q))),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

            /// Any sequence of movements keeps stock non-negative, rejected outbound
            /// movements leave it unchanged, and replaying the chain matches the cache.
            #[test]
            fn ledger_never_goes_negative_and_replays(ops in prop::collection::vec(arb_command(), 0..60)) {
                let tenant_id = test_tenant_id();
                let product_id = ProductId::generate();
                let mut ledger = StockLedger::empty(product_id);

                for (movement_type, quantity) in ops {
                    let before = ledger.quantity();
                    let cmd = movement(tenant_id, product_id, movement_type, quantity);
                    match execute(&mut ledger, &cmd) {
                        Ok(_) => {}
                        Err(DomainError::InsufficientStock { requested, available }) => {
                            prop_assert!(requested > available);
                            prop_assert_eq!(ledger.quantity(), before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                    }
                }

                let chronological: Vec<_> = ledger.movement_history().rev().cloned().collect();
                prop_assert_eq!(replay_quantity(&chronological).unwrap(), ledger.quantity());
                prop_assert_eq!(ledger.version() as usize, ledger.movement_count());
            }
        }
    }
}
