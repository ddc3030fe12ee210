use cucumber::given;
use order_payment_engine::test_utils::PaymentSystem;

use crate::cucumber::PaymentWorld;

#[given("a fresh install")]
async fn fresh_database(world: &mut PaymentWorld) {
    let system = PaymentSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "customer '{word}' has {int} of a product priced at {int} in their cart")]
async fn fill_cart(world: &mut PaymentWorld, customer_id: String, quantity: i64, price: i64) {
    world.system().add_to_cart(&customer_id, "Filter coffee beans", price, quantity).await;
}
