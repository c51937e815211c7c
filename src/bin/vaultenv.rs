fn main() -> color_eyre::Result<()> {
    vaultenv::cli::main()
}
