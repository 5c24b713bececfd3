//! Stock alerts, cash-register and dashboard reports, computed from the read models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use gescom_core::{Decimal, DomainResult, Money, TenantId, UserId};
use gescom_inventory::{stock_status, StockStatus};

use super::hub::ProjectionHub;
use super::products::ProductView;
use super::sales_orders::OrderView;

/// Orders shown on the dashboard.
pub const DASHBOARD_RECENT_ORDERS: usize = 5;

/// A catalog entry together with its current quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStock {
    #[serde(flatten)]
    pub product: ProductView,
    pub quantity: u32,
    pub stock_status: StockStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockStats {
    pub product_count: usize,
    pub total_quantity: u64,
    pub total_stock_value: Money,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashRegisterReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_sales: Money,
    pub order_count: usize,
    pub items_sold: u64,
    pub average_order_value: Money,
    pub orders: Vec<OrderView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub total_sales: Money,
    pub order_count: usize,
    pub product_count: usize,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
    pub outstanding_amount: Money,
    pub overdue_invoice_count: usize,
    pub recent_orders: Vec<OrderView>,
}

/// Active products with their stock, sorted by code.
pub fn product_stock(hub: &ProjectionHub, tenant_id: TenantId) -> Vec<ProductStock> {
    hub.products
        .list(tenant_id)
        .into_iter()
        .filter(|p| p.active)
        .map(|product| with_stock(hub, tenant_id, product))
        .collect()
}

pub fn with_stock(hub: &ProjectionHub, tenant_id: TenantId, product: ProductView) -> ProductStock {
    let quantity = hub.stock.quantity(tenant_id, &product.product_id);
    ProductStock {
        stock_status: stock_status(quantity, product.min_stock_alert),
        quantity,
        product,
    }
}

/// Products at or under their alert threshold but not empty.
pub fn low_stock(hub: &ProjectionHub, tenant_id: TenantId) -> Vec<ProductStock> {
    product_stock(hub, tenant_id)
        .into_iter()
        .filter(|p| p.stock_status == StockStatus::LowStock)
        .collect()
}

pub fn out_of_stock(hub: &ProjectionHub, tenant_id: TenantId) -> Vec<ProductStock> {
    product_stock(hub, tenant_id)
        .into_iter()
        .filter(|p| p.stock_status == StockStatus::OutOfStock)
        .collect()
}

pub fn stock_stats(hub: &ProjectionHub, tenant_id: TenantId) -> DomainResult<StockStats> {
    let products = product_stock(hub, tenant_id);

    let mut total_stock_value = Money::zero();
    for p in &products {
        total_stock_value = total_stock_value.checked_add(p.product.purchase_price.times(p.quantity)?)?;
    }

    Ok(StockStats {
        product_count: products.len(),
        total_quantity: products.iter().map(|p| u64::from(p.quantity)).sum(),
        total_stock_value,
        low_stock_count: products
            .iter()
            .filter(|p| p.stock_status == StockStatus::LowStock)
            .count(),
        out_of_stock_count: products
            .iter()
            .filter(|p| p.stock_status == StockStatus::OutOfStock)
            .count(),
    })
}

/// Sales taken in `[from, to)`, optionally by one operator.
pub fn cash_register(
    hub: &ProjectionHub,
    tenant_id: TenantId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    created_by: Option<UserId>,
) -> DomainResult<CashRegisterReport> {
    let orders = hub.orders.sales_between(tenant_id, from, to, created_by);
    let (total_sales, items_sold) = sales_totals(&orders)?;

    let average_order_value = if orders.is_empty() {
        Money::zero()
    } else {
        Money::new(total_sales.amount() / Decimal::from(orders.len()))?
    };

    Ok(CashRegisterReport {
        from,
        to,
        total_sales,
        order_count: orders.len(),
        items_sold,
        average_order_value,
        orders,
    })
}

pub fn dashboard(hub: &ProjectionHub, tenant_id: TenantId, today: NaiveDate) -> DomainResult<Dashboard> {
    let sales: Vec<OrderView> = hub
        .orders
        .list(tenant_id, None)
        .into_iter()
        .filter(|o| o.status.is_sale())
        .collect();
    let (total_sales, _) = sales_totals(&sales)?;
    let stats = stock_stats(hub, tenant_id)?;

    Ok(Dashboard {
        total_sales,
        order_count: sales.len(),
        product_count: stats.product_count,
        low_stock_count: stats.low_stock_count,
        out_of_stock_count: stats.out_of_stock_count,
        outstanding_amount: hub.invoices.outstanding_total(tenant_id)?,
        overdue_invoice_count: hub.invoices.overdue(tenant_id, today).len(),
        recent_orders: hub.orders.recent(tenant_id, DASHBOARD_RECENT_ORDERS),
    })
}

fn sales_totals(orders: &[OrderView]) -> DomainResult<(Money, u64)> {
    let mut total = Money::zero();
    let mut items = 0u64;
    for order in orders {
        total = total.checked_add(order.total_amount)?;
        items += order.items_count;
    }
    Ok((total, items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tenant_reports_zeroes() {
        let hub = ProjectionHub::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let report = cash_register(&hub, tenant, now, now, None).unwrap();
        assert_eq!(report.order_count, 0);
        assert_eq!(report.average_order_value, Money::zero());

        let stats = stock_stats(&hub, tenant).unwrap();
        assert_eq!(stats.product_count, 0);
        assert_eq!(stats.total_stock_value, Money::zero());
    }
}
