//! # agency-settlement -- Sale Settlement Core
//!
//! The transactional heart of the agency sales backend.
//!
//! | Component | Module | Entry point |
//! |-----------|--------|-------------|
//! | Commission split | [`commission`] | [`split_commission`] |
//! | Balance ledger | [`ledger`] | [`ledger::credit`], [`ledger::debit`] |
//! | Sale orchestration | [`coordinator`] | [`SaleCoordinator::complete_sale`] |
//! | Payment tokens | [`tokens`] | [`PaymentTokenIssuer::request_payment_token`] |
//! | Gateway callbacks | [`reconciler`] | [`CallbackReconciler::reconcile`] |
//! | Refunds | [`refund`] | [`RefundService::quote_refund`], [`RefundService::apply_refund`] |
//! | Tenancy | [`tenancy`] | [`TenancyService`] |
//!
//! Every mutating operation opens exactly one unit of work from the
//! injected [`agency_store::SettlementStore`], threads it through its
//! sub-steps and commits only if all of them succeed. Services hold no
//! state besides their injected collaborators.

pub mod commission;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod reconciler;
pub mod refund;
pub mod tenancy;
pub mod tokens;

pub use commission::{split_commission, CommissionSplit};
pub use coordinator::{
    CompleteSaleRequest, CompletedSale, CustomerInput, SaleCoordinator, SaleInput, VehicleInput,
};
pub use error::ServiceError;
pub use ledger::LedgerAccount;
pub use notify::{NotifyError, SaleNotifier, TracingNotifier};
pub use reconciler::{CallbackOutcome, CallbackReconciler};
pub use refund::{prorate, AppliedRefund, RefundCommand, RefundQuote, RefundService};
pub use tenancy::{NewAgency, NewBranch, TenancyService};
pub use tokens::PaymentTokenIssuer;
