//! Request DTOs. One canonical shape per resource; unknown fields are rejected.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use gescom_clients::{ClientDetails, ClientType, ContactInfo};
use gescom_core::{ClientId, Money, TaxRate, UserId};
use gescom_infra::projections::ProductView;
use gescom_infra::workflows::{
    DeliveryDetails, InvoiceRequest, MovementRequest, NewLine, NewOrder, NewProduct, PaymentRequest,
    ProductChanges,
};
use gescom_inventory::{MovementQuantity, MovementType};
use gescom_invoicing::PaymentMethod;
use gescom_products::{ProductDetails, ProductId, ProductPrices, DEFAULT_MIN_STOCK_ALERT, DEFAULT_UNIT};

/// Page size used when a history query gives none.
pub const DEFAULT_PAGE_SIZE: usize = 50;

// -------------------------
// Catalog
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub barcode: Option<String>,
    pub min_stock_alert: Option<u32>,
    pub purchase_price: Money,
    pub selling_price: Money,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(req: CreateProductRequest) -> Self {
        NewProduct {
            code: req.code,
            details: ProductDetails {
                name: req.name,
                description: req.description,
                category: req.category,
                unit: req.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
                barcode: req.barcode,
                min_stock_alert: req.min_stock_alert.unwrap_or(DEFAULT_MIN_STOCK_ALERT),
            },
            prices: ProductPrices {
                purchase_price: req.purchase_price,
                selling_price: req.selling_price,
            },
        }
    }
}

/// Partial update: absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub barcode: Option<String>,
    pub min_stock_alert: Option<u32>,
    pub purchase_price: Option<Money>,
    pub selling_price: Option<Money>,
}

impl UpdateProductRequest {
    pub fn into_changes(self, current: &ProductView) -> ProductChanges {
        let touches_details = self.name.is_some()
            || self.description.is_some()
            || self.category.is_some()
            || self.unit.is_some()
            || self.barcode.is_some()
            || self.min_stock_alert.is_some();
        let touches_prices = self.purchase_price.is_some() || self.selling_price.is_some();

        let details = touches_details.then(|| ProductDetails {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            description: self.description.or_else(|| current.description.clone()),
            category: self.category.or_else(|| current.category.clone()),
            unit: self.unit.unwrap_or_else(|| current.unit.clone()),
            barcode: self.barcode.or_else(|| current.barcode.clone()),
            min_stock_alert: self.min_stock_alert.unwrap_or(current.min_stock_alert),
        });
        let prices = touches_prices.then(|| ProductPrices {
            purchase_price: self.purchase_price.unwrap_or(current.purchase_price),
            selling_price: self.selling_price.unwrap_or(current.selling_price),
        });

        ProductChanges { details, prices }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStatusRequest {
    pub active: bool,
}

// -------------------------
// Clients
// -------------------------

/// Full client record, used to register a client and to replace its details.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub client_type: ClientType,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl From<ClientRequest> for ClientDetails {
    fn from(req: ClientRequest) -> Self {
        ClientDetails {
            first_name: req.first_name,
            last_name: req.last_name,
            company: req.company,
            client_type: req.client_type,
            contact: ContactInfo {
                email: req.email,
                phone: req.phone,
                address: req.address,
                city: req.city,
                postal_code: req.postal_code,
                country: req.country,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientQuery {
    pub active: Option<bool>,
    #[serde(rename = "type")]
    pub client_type: Option<String>,
}

// -------------------------
// Stock
// -------------------------

/// `quantity` is tagged: `{"delta": n}` moves stock, `{"set_to": n}` is the
/// counted quantity of an ADJUSTMENT. A form that does not fit the type is
/// rejected by the ledger.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordMovementRequest {
    pub movement_type: MovementType,
    pub quantity: MovementQuantity,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<Money>,
}

impl RecordMovementRequest {
    pub fn into_request(self, product_id: ProductId) -> MovementRequest {
        MovementRequest {
            product_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            reason: self.reason,
            reference: self.reference,
            unit_cost: self.unit_cost,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

// -------------------------
// Orders and deliveries
// -------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl From<OrderLineRequest> for NewLine {
    fn from(req: OrderLineRequest) -> Self {
        NewLine {
            product_id: req.product_id,
            quantity: req.quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceOrderRequest {
    pub client_id: ClientId,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<OrderLineRequest>,
    pub discount: Option<Money>,
}

impl From<PlaceOrderRequest> for NewOrder {
    fn from(req: PlaceOrderRequest) -> Self {
        NewOrder {
            client_id: req.client_id,
            shipping_address: req.shipping_address,
            billing_address: req.billing_address,
            notes: req.notes,
            lines: req.lines.into_iter().map(NewLine::from).collect(),
            discount: req.discount,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscountRequest {
    pub discount: Money,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDeliveryRequest {
    pub delivery_address: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

impl From<CreateDeliveryRequest> for DeliveryDetails {
    fn from(req: CreateDeliveryRequest) -> Self {
        DeliveryDetails {
            delivery_address: req.delivery_address,
            contact_name: req.contact_name,
            contact_phone: req.contact_phone,
            notes: req.notes,
        }
    }
}

// -------------------------
// Invoices
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInvoiceRequest {
    pub tax_rate: TaxRate,
    pub due_date: Option<NaiveDate>,
}

impl From<CreateInvoiceRequest> for InvoiceRequest {
    fn from(req: CreateInvoiceRequest) -> Self {
        InvoiceRequest {
            tax_rate: req.tax_rate,
            due_date: req.due_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPaymentRequest {
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_on: Option<NaiveDate>,
    pub reference: Option<String>,
}

impl From<RecordPaymentRequest> for PaymentRequest {
    fn from(req: RecordPaymentRequest) -> Self {
        PaymentRequest {
            amount: req.amount,
            method: req.method,
            paid_on: req.paid_on,
            reference: req.reference,
        }
    }
}

// -------------------------
// Reports
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CashRegisterQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityQuery {
    pub actor: Option<UserId>,
    pub action: Option<String>,
    pub entity: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{"code":"A","name":"a","purchase_price":"1","selling_price":"2","sku":"x"}"#;
        assert!(serde_json::from_str::<CreateProductRequest>(raw).is_err());
    }

    #[test]
    fn movement_quantity_is_tagged() {
        let product_id = ProductId::generate();
        let req: RecordMovementRequest =
            serde_json::from_str(r#"{"movement_type":"ADJUSTMENT","quantity":{"set_to":7}}"#).unwrap();
        assert_eq!(req.into_request(product_id).quantity, MovementQuantity::SetTo(7));

        let req: RecordMovementRequest =
            serde_json::from_str(r#"{"movement_type":"OUT","quantity":{"delta":3},"reason":"casse"}"#).unwrap();
        let movement = req.into_request(product_id);
        assert_eq!(movement.quantity, MovementQuantity::Delta(3));
        assert_eq!(movement.movement_type, MovementType::StockOut);

        // A bare number no longer means "delta or target depending on the type".
        assert!(serde_json::from_str::<RecordMovementRequest>(r#"{"movement_type":"OUT","quantity":3}"#).is_err());
    }

    #[test]
    fn client_request_defaults_to_an_individual() {
        let req: ClientRequest =
            serde_json::from_str(r#"{"first_name":"Sara","last_name":"Idrissi","city":"Fes"}"#).unwrap();
        let details = ClientDetails::from(req);
        assert_eq!(details.client_type, ClientType::Individual);
        assert_eq!(details.contact.city.as_deref(), Some("Fes"));

        let raw = r#"{"company":"Atlas","client_type":"ENTREPRISE","ice":"0012"}"#;
        assert!(serde_json::from_str::<ClientRequest>(raw).is_err());
    }

    #[test]
    fn order_lines_default_to_empty() {
        let client = ClientId::new();
        let raw = format!(r#"{{"client_id":"{client}"}}"#);
        let order: NewOrder = serde_json::from_str::<PlaceOrderRequest>(&raw).unwrap().into();
        assert!(order.lines.is_empty());
        assert_eq!(order.discount, None);
    }
}
