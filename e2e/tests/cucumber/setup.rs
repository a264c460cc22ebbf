use cucumber::given;
use kiosk_engine::events::Topic;
use log::info;

use crate::cucumber::KioskWorld;

#[given(expr = "a kiosk backend with access token {string} and webhook secret {string}")]
async fn start_backend(world: &mut KioskWorld, token: String, secret: String) {
    world.set_access_token(&token);
    world.set_webhook_secret(&secret);
    world.start_server();
}

#[given("an open kiosk backend")]
async fn start_open_backend(world: &mut KioskWorld) {
    world.set_webhook_secret("open-backend-secret");
    world.start_server();
}

#[given(expr = "the kiosk listens to the {string} stream")]
async fn listen(world: &mut KioskWorld, topic: String) {
    let topic = topic.parse::<Topic>().expect("Unknown topic");
    world.listen(topic).await;
    info!("🌍️ Kiosk is listening to {topic}");
}
