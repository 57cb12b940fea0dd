pub mod account;
pub mod priority;
pub mod todo;

pub use account::Entity as Account;
pub use priority::Entity as Priority;
pub use todo::Entity as Todo;
