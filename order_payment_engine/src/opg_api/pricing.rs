use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CartItem, MinorUnits, NewOrderItem, Product},
    opg_api::errors::PaymentFlowError,
};

/// How order totals are derived from catalog prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub currency: String,
    /// Tax rate in basis points, applied to the discounted subtotal.
    pub tax_rate_bps: i64,
    pub shipping_fee: MinorUnits,
    /// Orders whose discounted subtotal reaches this amount ship for free.
    pub free_shipping_threshold: Option<MinorUnits>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            tax_rate_bps: 1_800,
            shipping_fee: MinorUnits::from(5_000),
            free_shipping_threshold: Some(MinorUnits::from(50_000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub items: Vec<NewOrderItem>,
    pub subtotal: MinorUnits,
    pub discount: MinorUnits,
    pub tax: MinorUnits,
    pub shipping: MinorUnits,
    /// `subtotal + tax + shipping - discount`
    pub total: MinorUnits,
}

impl PricingPolicy {
    /// Prices the cart using only the catalog's current prices.
    pub fn price_cart(&self, cart: &[CartItem], products: &[Product]) -> Result<PriceBreakdown, PaymentFlowError> {
        if cart.is_empty() {
            return Err(PaymentFlowError::Validation("The cart is empty".to_string()));
        }
        let catalog = products.iter().map(|p| (p.id, p)).collect::<HashMap<_, _>>();
        let mut items = Vec::with_capacity(cart.len());
        let mut subtotal = MinorUnits::default();
        let mut discount = MinorUnits::default();
        for line in cart {
            if line.quantity <= 0 {
                return Err(PaymentFlowError::Validation(format!(
                    "Invalid quantity {} for product {}",
                    line.quantity, line.product_id
                )));
            }
            let product = catalog
                .get(&line.product_id)
                .filter(|p| p.active)
                .ok_or_else(|| PaymentFlowError::Validation(format!("Product {} is not available", line.product_id)))?;
            let line_total = product.price.checked_mul(line.quantity).ok_or_else(|| too_large(line.product_id))?;
            let line_discount =
                product.unit_discount().checked_mul(line.quantity).ok_or_else(|| too_large(line.product_id))?;
            subtotal = subtotal.checked_add(line_total).ok_or_else(|| too_large(line.product_id))?;
            discount = discount.checked_add(line_discount).ok_or_else(|| too_large(line.product_id))?;
            items.push(NewOrderItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                quantity: line.quantity,
                line_total,
            });
        }
        let overflow = || PaymentFlowError::Validation("The order total is too large".to_string());
        let taxable = subtotal.checked_sub(discount).ok_or_else(overflow)?;
        let tax = taxable.apply_basis_points(self.tax_rate_bps).ok_or_else(overflow)?;
        let shipping = match self.free_shipping_threshold {
            Some(threshold) if taxable >= threshold => MinorUnits::default(),
            _ => self.shipping_fee,
        };
        let total = taxable.checked_add(tax).and_then(|t| t.checked_add(shipping)).ok_or_else(overflow)?;
        Ok(PriceBreakdown { items, subtotal, discount, tax, shipping, total })
    }
}

fn too_large(product_id: i64) -> PaymentFlowError {
    PaymentFlowError::Validation(format!("The quantity of product {product_id} is too large"))
}

#[cfg(test)]
mod test {
    use super::*;

    fn product(id: i64, price: i64, sale_price: Option<i64>) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            price: price.into(),
            sale_price: sale_price.map(MinorUnits::from),
            active: true,
        }
    }

    fn cart(lines: &[(i64, i64)]) -> Vec<CartItem> {
        lines.iter().map(|(p, q)| CartItem { customer_id: "alice".into(), product_id: *p, quantity: *q }).collect()
    }

    fn policy() -> PricingPolicy {
        PricingPolicy {
            currency: "INR".into(),
            tax_rate_bps: 1_000,
            shipping_fee: 500.into(),
            free_shipping_threshold: Some(20_000.into()),
        }
    }

    #[test]
    fn total_is_built_from_catalog_prices() {
        let products = vec![product(1, 4_000, None), product(2, 2_000, None)];
        let price = policy().price_cart(&cart(&[(1, 2), (2, 1)]), &products).unwrap();
        assert_eq!(price.subtotal, MinorUnits::from(10_000));
        assert_eq!(price.discount, MinorUnits::from(0));
        assert_eq!(price.tax, MinorUnits::from(1_000));
        assert_eq!(price.shipping, MinorUnits::from(500));
        assert_eq!(price.total, MinorUnits::from(11_500));
        assert_eq!(price.items.len(), 2);
        assert_eq!(price.items[0].line_total, MinorUnits::from(8_000));
    }

    #[test]
    fn sale_prices_become_discounts() {
        let products = vec![product(1, 5_000, Some(4_000))];
        let price = policy().price_cart(&cart(&[(1, 3)]), &products).unwrap();
        assert_eq!(price.subtotal, MinorUnits::from(15_000));
        assert_eq!(price.discount, MinorUnits::from(3_000));
        assert_eq!(price.tax, MinorUnits::from(1_200));
        assert_eq!(price.total, MinorUnits::from(15_000 + 1_200 + 500 - 3_000));
    }

    #[test]
    fn free_shipping_over_threshold() {
        let products = vec![product(1, 20_000, None)];
        let price = policy().price_cart(&cart(&[(1, 1)]), &products).unwrap();
        assert_eq!(price.shipping, MinorUnits::from(0));
        assert_eq!(price.total, MinorUnits::from(22_000));
    }

    #[test]
    fn invalid_carts_are_rejected() {
        let products = vec![product(1, 1_000, None)];
        let p = policy();
        assert!(matches!(p.price_cart(&[], &products), Err(PaymentFlowError::Validation(_))));
        assert!(matches!(p.price_cart(&cart(&[(1, 0)]), &products), Err(PaymentFlowError::Validation(_))));
        assert!(matches!(p.price_cart(&cart(&[(9, 1)]), &products), Err(PaymentFlowError::Validation(_))));
        let mut inactive = product(1, 1_000, None);
        inactive.active = false;
        assert!(matches!(p.price_cart(&cart(&[(1, 1)]), &[inactive]), Err(PaymentFlowError::Validation(_))));
    }

    #[test]
    fn huge_quantities_are_rejected() {
        let products = vec![product(1, 10_000, None)];
        let p = policy();
        let err = p.price_cart(&cart(&[(1, i64::MAX / 1_000)]), &products).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request. The quantity of product 1 is too large");
        // Each line fits, but the subtotal does not
        let half = i64::MAX / 20_000;
        let err = p.price_cart(&cart(&[(1, half), (1, half), (1, half)]), &products).unwrap_err();
        assert!(matches!(err, PaymentFlowError::Validation(_)), "{err:?}");
        // The subtotal fits, but the tax pushes the total over
        let err = p.price_cart(&cart(&[(1, i64::MAX / 10_500)]), &products).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request. The order total is too large");
    }
}
