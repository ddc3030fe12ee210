mod checkout;
mod helpers;
mod mocks;
mod orders;
mod payments;
mod refunds;
mod webhooks;
