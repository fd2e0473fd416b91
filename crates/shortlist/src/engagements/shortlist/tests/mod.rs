mod common;

mod concurrency;
mod routing;
