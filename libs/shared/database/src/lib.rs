pub mod memory;
pub mod store;
pub mod supabase;

pub use memory::InMemoryStore;
pub use store::{AppointmentFilter, BookingGuard, QueueFilter, SchedulingStore, StoreError, StoreResult};
pub use supabase::{SupabaseApiError, SupabaseClient, SupabaseStore};
