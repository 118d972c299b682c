mod common;
mod dispatch;
mod reoptimization;
