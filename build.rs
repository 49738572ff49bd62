fn main() {
    // Network and broker settings are baked in at compile time by toml-cfg
    println!("cargo:rerun-if-changed=cfg.toml");
    embuild::espidf::sysenv::output();
}
