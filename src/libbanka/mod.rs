pub mod analyze;
pub mod assets;
pub mod category;
pub mod index;
pub mod maintenance;
pub mod model;
pub mod normalize;
pub mod propagate;
pub mod store;
