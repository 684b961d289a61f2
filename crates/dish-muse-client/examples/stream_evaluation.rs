use dish_muse_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let chat = ChatClient::new(ClientConfig::from_env()?)?;

    let mut stream = chat.start_stream(
        &[ChatMessage::user(
            "Ingredients: tofu, minced pork. Seasonings: chili bean paste. Method: braise. \
             Describe the likely taste in two sentences.",
        )],
        CancellationToken::new(),
    );

    let mut printed = 0;
    while let Some(event) = stream.next_event().await {
        match event {
            ChatEvent::Update { content } => {
                print!("{}", &content[printed..]);
                printed = content.len();
            }
            ChatEvent::Completed => println!(),
            ChatEvent::Failed(err) => eprintln!("chat error: {err}"),
            ChatEvent::Aborted => eprintln!("aborted"),
        }
    }
    Ok(())
}
