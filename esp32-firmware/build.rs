fn main() {
    // ESP-IDF build configuration
    embuild::espidf::sysenv::output();
}
