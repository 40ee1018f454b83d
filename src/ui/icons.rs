pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const INFO: &str = "ℹ️";
    pub const MOD: &str = "📝";
    pub const PACKAGE: &str = "📦";
    pub const GEAR: &str = "⚙️";
    pub const COMMIT: &str = "🔖";
}
