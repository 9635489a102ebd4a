//! Payment token issuance for PENDING gateway payments.
//!
//! Reads the sale in its own unit of work, then calls the gateway outside
//! of it. Nothing is written, so callers can retry after a timeout.

use agency_core::{PaymentMethod, PaymentStatus, SaleId, SettlementError};
use agency_gateway::{BasketItem, GatewayClient, GatewayError, PaymentToken, TokenRequest};
use agency_store::{StoreHandle, UnitOfWork};

use crate::error::{finish, ServiceError};

/// Requests gateway tokens for existing sales.
#[derive(Debug, Clone)]
pub struct PaymentTokenIssuer {
    store: StoreHandle,
    gateway: GatewayClient,
}

impl PaymentTokenIssuer {
    pub fn new(store: StoreHandle, gateway: GatewayClient) -> Self {
        Self { store, gateway }
    }

    pub async fn request_payment_token(
        &self,
        sale_id: SaleId,
        caller_ip: &str,
    ) -> Result<PaymentToken, ServiceError> {
        let mut uow = self.store.begin().await?;
        let result = build_request(uow.as_mut(), sale_id, caller_ip).await;
        let request = finish(uow, result).await?;

        self.gateway.request_token(&request).await.map_err(|e| match e {
            GatewayError::InvalidRequest(msg) => SettlementError::Validation(msg).into(),
            other => ServiceError::Upstream(other),
        })
    }
}

async fn build_request(
    uow: &mut dyn UnitOfWork,
    sale_id: SaleId,
    caller_ip: &str,
) -> Result<TokenRequest, ServiceError> {
    let sale = uow
        .sale(sale_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("sale", sale_id))?;
    let payment = uow
        .payment_for_sale(sale_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("payment", sale_id))?;
    if payment.method != PaymentMethod::Gateway || payment.status != PaymentStatus::Pending {
        return Err(SettlementError::Validation(format!(
            "sale {sale_id} has a {} {} payment; tokens are issued only for pending gateway payments",
            payment.status, payment.method
        ))
        .into());
    }

    let customer = uow
        .customer(sale.customer_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("customer", sale.customer_id))?;
    let email = customer
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| SettlementError::Validation("customer email is required for card payment".into()))?;
    let package = uow
        .package(sale.package_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("package", sale.package_id))?;

    Ok(TokenRequest {
        sale_id,
        user_ip: caller_ip.to_string(),
        email,
        amount: sale.price,
        basket: vec![BasketItem {
            name: package.name,
            unit_price: sale.price,
            quantity: 1,
        }],
        user_name: customer.full_name,
        user_phone: customer.phone,
        user_address: customer.address,
    })
}
