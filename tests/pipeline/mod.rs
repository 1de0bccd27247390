mod http_session;
mod mock_pipeline;
mod runner;
