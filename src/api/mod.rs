use rocket::Route;

mod eins;
mod email;
mod status;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(eins::routes());
    routes.extend(email::routes());
    routes.extend(status::routes());
    routes
}
