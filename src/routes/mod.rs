/// Router Module Index
///
/// The console's routes are split by who may reach them. Access control is applied
/// per module with a route layer, so a handler can never be mounted without it by
/// accident.

/// Routes anyone can reach: health, login, session status and the unauthorized page.
pub mod public;

/// Routes behind the route guard. Require an authenticated session with the
/// configured role (admin by default).
pub mod admin;

/// Routes for any signed-in session, currently just logout.
pub mod account;
