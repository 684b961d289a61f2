use dish_muse_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let images = ImageClient::new(ClientConfig::from_env()?)?;

    let url = images
        .generate(
            "An exquisite braised tofu dish, elegant plating, food photography",
            |progress| eprintln!("progress: {:.0}%", progress * 100.0),
        )
        .await?;

    println!("{url}");
    Ok(())
}
