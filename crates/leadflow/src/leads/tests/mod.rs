mod common;
mod notifier;
mod scoring;
