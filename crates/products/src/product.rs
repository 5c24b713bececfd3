use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::{Aggregate, AggregateRoot, DomainError, Money, TenantId, UserId};
use gescom_events::Event;

gescom_core::aggregate_id_newtype!(
    /// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
    ///
    /// The same id keys the product's stock ledger stream.
    ProductId
);

/// Unit of measure used when none is given.
pub const DEFAULT_UNIT: &str = "pièce";

/// Low-stock threshold used when none is given.
pub const DEFAULT_MIN_STOCK_ALERT: u32 = 10;

/// Descriptive catalog fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub barcode: Option<String>,
    pub min_stock_alert: u32,
}

impl ProductDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            category: None,
            unit: DEFAULT_UNIT.to_string(),
            barcode: None,
            min_stock_alert: DEFAULT_MIN_STOCK_ALERT,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::invalid_input("name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::invalid_input("unit cannot be empty"));
        }
        Ok(())
    }
}

/// Purchase and selling price of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrices {
    pub purchase_price: Money,
    pub selling_price: Money,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    code: String,
    details: ProductDetails,
    prices: ProductPrices,
    active: bool,
    version: u64,
    created: bool,
}

impl Product {
    pub const AGGREGATE_TYPE: &'static str = "products.product";

    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            details: ProductDetails::named(""),
            prices: ProductPrices {
                purchase_price: Money::zero(),
                selling_price: Money::zero(),
            },
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn prices(&self) -> ProductPrices {
        self.prices
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Only active products can be put on new orders.
    pub fn can_be_sold(&self) -> bool {
        self.created && self.active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub code: String,
    pub details: ProductDetails,
    pub prices: ProductPrices,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangePrices.
///
/// Existing orders keep the unit price captured when their lines were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePrices {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub prices: ProductPrices,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetProductActive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProductActive {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub active: bool,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
    ChangePrices(ChangePrices),
    SetProductActive(SetProductActive),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub code: String,
    pub details: ProductDetails,
    pub prices: ProductPrices,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductPricesChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricesChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub prices: ProductPrices,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
    ProductPricesChanged(ProductPricesChanged),
    ProductActivated(ProductActivated),
    ProductDeactivated(ProductDeactivated),
}

impl ProductEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ProductEvent::ProductCreated(e) => e.tenant_id,
            ProductEvent::ProductDetailsUpdated(e) => e.tenant_id,
            ProductEvent::ProductPricesChanged(e) => e.tenant_id,
            ProductEvent::ProductActivated(e) => e.tenant_id,
            ProductEvent::ProductDeactivated(e) => e.tenant_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductDetailsUpdated(e) => e.product_id,
            ProductEvent::ProductPricesChanged(e) => e.product_id,
            ProductEvent::ProductActivated(e) => e.product_id,
            ProductEvent::ProductDeactivated(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "products.product.details_updated",
            ProductEvent::ProductPricesChanged(_) => "products.product.prices_changed",
            ProductEvent::ProductActivated(_) => "products.product.activated",
            ProductEvent::ProductDeactivated(_) => "products.product.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
            ProductEvent::ProductPricesChanged(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.details = e.details.clone();
                self.prices = e.prices;
                self.active = true;
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.details = e.details.clone();
            }
            ProductEvent::ProductPricesChanged(e) => {
                self.prices = e.prices;
            }
            ProductEvent::ProductActivated(_) => {
                self.active = true;
            }
            ProductEvent::ProductDeactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update_details(cmd),
            ProductCommand::ChangePrices(cmd) => self.handle_change_prices(cmd),
            ProductCommand::SetProductActive(cmd) => self.handle_set_active(cmd),
        }
    }
}

impl Product {
    fn ensure_exists(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::invalid_input("code cannot be empty"));
        }
        cmd.details.validate()?;

        // Code uniqueness per tenant is checked against the catalog read model
        // before the command is dispatched.
        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            code: cmd.code.trim().to_string(),
            details: cmd.details.clone(),
            prices: cmd.prices,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(
        &self,
        cmd: &UpdateProductDetails,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.product_id)?;
        cmd.details.validate()?;

        if cmd.details == self.details {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            details: cmd.details.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_prices(&self, cmd: &ChangePrices) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.product_id)?;

        if cmd.prices == self.prices {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductPricesChanged(ProductPricesChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            prices: cmd.prices,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetProductActive) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.product_id)?;

        if cmd.active == self.active {
            return Ok(vec![]);
        }

        let event = if cmd.active {
            ProductEvent::ProductActivated(ProductActivated {
                tenant_id: cmd.tenant_id,
                product_id: cmd.product_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            })
        } else {
            ProductEvent::ProductDeactivated(ProductDeactivated {
                tenant_id: cmd.tenant_id,
                product_id: cmd.product_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            })
        };
        Ok(vec![event])
    }
}
