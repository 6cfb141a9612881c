//! CLI configuration

use courier_client::DispatcherClient;

pub struct Config {
    pub dispatcher_url: String,
    pub token: Option<String>,
}

impl Config {
    pub fn client(&self) -> DispatcherClient {
        let client = DispatcherClient::new(&self.dispatcher_url);
        match &self.token {
            Some(token) => client.with_token(token),
            None => client,
        }
    }
}
