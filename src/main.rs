#[actix_web::main]
async fn main() -> Result<(), rest_relay::AppError> {
    rest_relay::run().await
}
