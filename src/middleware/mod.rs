/*
 * Responsibility
 * - Public interface of the middleware (apply functions per concern)
 */
pub mod cors;
pub mod http;
