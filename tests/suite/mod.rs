mod cli;
mod concurrency;
mod integrity;
mod pipeline;
mod scenarios;
